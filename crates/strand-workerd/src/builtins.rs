//! Tasks every worker serves out of the box.
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use strand_core::Task;
use strand_exec::{ExecError, TaskRegistry};
use strand_model::{Args, TaskFailure};

pub fn registry() -> Result<TaskRegistry, ExecError> {
    let mut registry = TaskRegistry::new();
    registry.register(echo())?;
    registry.register(sleep())?;
    registry.register(add())?;
    registry.register(fail())?;
    Ok(registry)
}

/// Returns `value`, or every argument as an object when `value` is absent.
fn echo() -> Task {
    Task::blocking("echo", |args: Args| match args.get_raw("value") {
        Some(v) => Ok(v.clone()),
        None => serde_json::to_value(&args)
            .map_err(|e| TaskFailure::raised(format!("failed to echo arguments: {e}"))),
    })
}

/// Sleeps for `secs` seconds and returns them.
fn sleep() -> Task {
    Task::asynchronous("sleep", |args: Args, cancel: CancellationToken| async move {
        let secs: f64 = args.get("secs")?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(TaskFailure::raised(format!("invalid sleep duration {secs}")));
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => Ok(secs),
            _ = cancel.cancelled() => Err(TaskFailure::cancelled("sleep cancelled")),
        }
    })
}

fn add() -> Task {
    Task::blocking("add", |args: Args| {
        let a: Value = args.get("a")?;
        let b: Value = args.get("b")?;
        match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a
                .checked_add(b)
                .map(Value::from)
                .ok_or_else(|| TaskFailure::raised("integer overflow")),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Ok(json!(a + b)),
                _ => Err(TaskFailure::raised("add expects two numbers")),
            },
        }
    })
}

/// Always raises with `message`.
fn fail() -> Task {
    Task::blocking("fail", |args: Args| {
        let message = args
            .get_raw("message")
            .and_then(Value::as_str)
            .unwrap_or("requested failure")
            .to_string();
        Err::<Value, _>(TaskFailure::raised(message))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::Callable;

    fn call(task: &Task, args: Args) -> Result<Value, TaskFailure> {
        match task.callable() {
            Callable::Blocking(f) => f(args),
            Callable::Async(_) => panic!("{} is async", task.name()),
        }
    }

    #[test]
    fn registry_has_all_builtins() {
        let registry = registry().unwrap();
        assert_eq!(registry.names(), vec!["add", "echo", "fail", "sleep"]);
    }

    #[test]
    fn echo_returns_value_or_all_args() {
        let task = echo();
        assert_eq!(call(&task, Args::new().with("value", json!([1, 2]))).unwrap(), json!([1, 2]));
        assert_eq!(
            call(&task, Args::new().with("x", json!(1))).unwrap(),
            json!({"x": 1})
        );
    }

    #[test]
    fn add_keeps_integers_exact() {
        let task = add();
        let out = call(&task, Args::new().with("a", json!(2)).with("b", json!(40))).unwrap();
        assert_eq!(out, json!(42));

        let out = call(&task, Args::new().with("a", json!(0.5)).with("b", json!(1))).unwrap();
        assert_eq!(out, json!(1.5));

        let err = call(&task, Args::new().with("a", json!("x")).with("b", json!(1))).unwrap_err();
        assert_eq!(err.message, "add expects two numbers");
    }

    #[test]
    fn fail_uses_message() {
        let err = call(&fail(), Args::new().with("message", json!("boom"))).unwrap_err();
        assert_eq!(err.message, "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_honours_cancellation() {
        let Callable::Async(f) = sleep().callable().clone() else {
            panic!("sleep is async");
        };
        let cancel = CancellationToken::new();
        let fut = f(Args::new().with("secs", json!(60)), cancel.clone());
        cancel.cancel();
        assert!(fut.await.is_err());

        let out = f(Args::new().with("secs", json!(0.25)), CancellationToken::new()).await;
        assert_eq!(out.unwrap(), json!(0.25));
    }
}
