mod init;
pub use init::InitOptions;

mod remote;
pub use remote::RemoteOptions;
