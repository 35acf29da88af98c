mod args;
pub use args::Args;

mod labels;
pub use labels::Labels;

mod run_id;
pub use run_id::RunId;
