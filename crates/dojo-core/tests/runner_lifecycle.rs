//! End-to-end lifecycle tests for the serialized runner.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dojo_core::domain::failure::{ErrorOrigin, RunFailure, TIMEOUT_MESSAGE};
use dojo_core::environment::{EnvironmentHandle, ExecutionHost, LocalHost, StaticFixtures};
use dojo_core::{EnvironmentError, EnvironmentFactory, Run, RunContext, Runner, TestError};
use futures::future::{self, Ready};
use tokio::sync::oneshot;

fn host() -> Arc<LocalHost> {
    Arc::new(LocalHost::with_loader(Arc::new(
        StaticFixtures::new().with("fixtures/page.html", "<main id=\"app\"></main>"),
    )))
}

fn marker_run(log: Arc<Mutex<Vec<String>>>, name: &'static str, hold: Duration) -> Run {
    Run::new(move |ctx: RunContext| async move {
        log.lock().unwrap().push(format!("{name}:start"));
        tokio::time::sleep(hold).await;
        log.lock().unwrap().push(format!("{name}:end"));
        ctx.done.succeed();
        Ok(())
    })
    .with_label(name)
}

async fn wait_until_idle(runner: &Runner) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !runner.is_idle() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("runner went idle");
}

// -------------------------------------------------------------------------
// Serialization
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_runs_never_overlap() {
    let runner = Runner::new(host());
    let log = Arc::new(Mutex::new(Vec::new()));

    let (a, b, c) = tokio::join!(
        runner.execute(marker_run(log.clone(), "a", Duration::from_millis(30))),
        runner.execute(marker_run(log.clone(), "b", Duration::from_millis(5))),
        runner.execute(marker_run(log.clone(), "c", Duration::from_millis(0))),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    assert_eq!(
        *log.lock().unwrap(),
        vec!["a:start", "a:end", "b:start", "b:end", "c:start", "c:end"]
    );
}

#[tokio::test]
async fn test_queue_introspection() {
    let runner = Runner::new(host());
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let (settled_tx, settled_rx) = oneshot::channel();

    runner.submit(
        Run::new(move |ctx: RunContext| async move {
            let _ = release_rx.await;
            ctx.done.succeed();
            Ok(())
        })
        .with_label("blocking"),
    );
    runner.submit(Run::new(|ctx: RunContext| async move {
        ctx.done.succeed();
        Ok(())
    }));
    runner.submit(
        Run::new(|ctx: RunContext| async move {
            ctx.done.succeed();
            Ok(())
        })
        .on_settle(move |outcome| {
            let _ = settled_tx.send(outcome);
        }),
    );

    assert!(!runner.is_idle());
    assert_eq!(runner.queued(), 2);

    release_tx.send(()).unwrap();
    assert!(settled_rx.await.unwrap().is_ok());
    wait_until_idle(&runner).await;
    assert_eq!(runner.queued(), 0);
}

// -------------------------------------------------------------------------
// Timeouts
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_timeout_settles_and_frees_the_runner() {
    let runner = Runner::new(host());
    let (env_tx, env_rx) = oneshot::channel::<EnvironmentHandle>();

    let started = Instant::now();
    let outcome = runner
        .execute(
            Run::new(move |ctx: RunContext| async move {
                let env = ctx.environments.acquire().await.expect("environment");
                let _ = env_tx.send(env);
                let _held = ctx.done;
                future::pending::<()>().await;
                Ok(())
            })
            .with_label("never settles")
            .with_timeout(Duration::from_millis(50)),
        )
        .await;
    let elapsed = started.elapsed();

    let failure = outcome.unwrap_err();
    assert!(failure.is_timeout());
    assert_eq!(failure.first_error().unwrap().message, TIMEOUT_MESSAGE);
    assert!(elapsed >= Duration::from_millis(50), "settled early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(250), "settled late: {elapsed:?}");

    let env = env_rx.await.unwrap();
    assert!(env.is_released());

    let next = runner
        .execute(Run::new(|ctx: RunContext| async move {
            ctx.done.succeed();
            Ok(())
        }))
        .await;
    assert!(next.is_ok());
}

#[tokio::test]
async fn test_settling_before_deadline_is_not_a_timeout() {
    let runner = Runner::new(host());
    let outcome = runner
        .execute(
            Run::new(|ctx: RunContext| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                ctx.done.succeed();
                Ok(())
            })
            .with_timeout(Duration::from_millis(200)),
        )
        .await;
    assert!(outcome.is_ok());
}

// -------------------------------------------------------------------------
// Error interception
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_uncaught_error_settles_the_run() {
    let host = host();
    let runner = Runner::new(host.clone());

    let outcome = runner
        .execute(
            Run::new(|ctx: RunContext| async move {
                let env = ctx.environments.acquire().await.expect("environment");
                let raiser = env.clone();
                env.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    raiser.raise(TestError::new("late boom").with_stack("Error: late boom\n    at <anonymous>"));
                });
                let _held = ctx.done;
                future::pending::<()>().await;
                Ok(())
            })
            .with_timeout(Duration::from_secs(2)),
        )
        .await;

    let failure = outcome.unwrap_err();
    let error = failure.first_error().unwrap();
    assert_eq!(error.message, "late boom");
    assert_eq!(error.origin, ErrorOrigin::Uncaught);
    assert!(!host.has_uncaught_handler());
}

#[tokio::test]
async fn test_panic_in_background_work_is_uncaught() {
    let runner = Runner::new(host());
    let outcome = runner
        .execute(
            Run::new(|ctx: RunContext| async move {
                let env = ctx.environments.acquire().await.expect("environment");
                env.spawn(async {
                    panic!("handler exploded");
                });
                let _held = ctx.done;
                future::pending::<()>().await;
                Ok(())
            })
            .with_timeout(Duration::from_secs(2)),
        )
        .await;

    let failure = outcome.unwrap_err();
    assert_eq!(failure.first_error().unwrap().message, "handler exploded");
    assert_eq!(failure.first_error().unwrap().origin, ErrorOrigin::Uncaught);
}

#[tokio::test]
async fn test_uncaught_error_outside_a_run_is_not_consumed() {
    let host = host();
    let runner = Runner::new(host.clone());
    runner
        .execute(Run::new(|ctx: RunContext| async move {
            ctx.done.succeed();
            Ok(())
        }))
        .await
        .unwrap();

    assert!(!host.report_uncaught(TestError::new("stray")));
}

fn panics_before_returning(_ctx: RunContext) -> Ready<Result<(), TestError>> {
    panic!("sync boom")
}

#[tokio::test]
async fn test_synchronous_panic_is_caught() {
    let runner = Runner::new(host());
    let failure = runner.execute(Run::new(panics_before_returning)).await.unwrap_err();
    let error = failure.first_error().unwrap();
    assert_eq!(error.message, "sync boom");
    assert_eq!(error.origin, ErrorOrigin::Panicked);

    // The runner survives and keeps serving.
    let next = runner
        .execute(Run::new(|ctx: RunContext| async move {
            ctx.done.succeed();
            Ok(())
        }))
        .await;
    assert!(next.is_ok());
}

#[tokio::test]
async fn test_panic_after_await_is_caught() {
    let runner = Runner::new(host());
    let failure = runner
        .execute(Run::new(|ctx: RunContext| async move {
            let _held = ctx.done;
            tokio::task::yield_now().await;
            if ctx.environments.live() == 0 {
                panic!("async boom");
            }
            Ok(())
        }))
        .await
        .unwrap_err();
    assert_eq!(failure.first_error().unwrap().message, "async boom");
}

#[tokio::test]
async fn test_returned_error_is_thrown() {
    let runner = Runner::new(host());
    let failure = runner
        .execute(Run::new(|_ctx: RunContext| async move {
            Err(TestError::new("ReferenceError: foo is not defined"))
        }))
        .await
        .unwrap_err();
    match failure {
        RunFailure::Error(error) => {
            assert_eq!(error.origin, ErrorOrigin::Thrown);
            assert_eq!(error.message, "ReferenceError: foo is not defined");
        }
        other => panic!("expected a single error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_settlement_wins() {
    let runner = Runner::new(host());
    let outcome = runner
        .execute(Run::new(|ctx: RunContext| async move {
            ctx.done.succeed();
            Err(TestError::new("too late"))
        }))
        .await;
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_settle_callback_panic_does_not_stall_the_queue() {
    let runner = Runner::new(host());
    runner.submit(
        Run::new(|ctx: RunContext| async move {
            ctx.done.succeed();
            Ok(())
        })
        .on_settle(|_| panic!("callback exploded")),
    );
    let next = runner
        .execute(Run::new(|ctx: RunContext| async move {
            ctx.done.succeed();
            Ok(())
        }))
        .await;
    assert!(next.is_ok());
}

// -------------------------------------------------------------------------
// Environment bookkeeping
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_acquire_and_release_are_balanced() {
    let host = host();
    let runner = Runner::new(host.clone());

    for round in 0..6u32 {
        let run = Run::new(move |ctx: RunContext| async move {
            let a = ctx.environments.acquire().await.expect("environment");
            let _b = ctx.environments.acquire().await.expect("environment");
            a.set_global("round", round.into());
            match round % 3 {
                0 => ctx.done.succeed(),
                1 => ctx.done.fail(TestError::new("wrong answer")),
                _ => {
                    let _held = ctx.done;
                    future::pending::<()>().await;
                }
            }
            Ok(())
        })
        .with_fixture(Some("fixtures/page.html".to_string()))
        .with_timeout(Duration::from_millis(20));
        let _ = runner.execute(run).await;
    }

    let stats = host.stats();
    assert_eq!(stats.attached, 12);
    assert_eq!(stats.detached, 12);
    assert_eq!(stats.live, 0);
}

#[tokio::test]
async fn test_scope_is_closed_after_settlement() {
    let runner = Runner::new(host());
    let (scope_tx, scope_rx) = oneshot::channel::<EnvironmentFactory>();

    runner
        .execute(Run::new(move |ctx: RunContext| async move {
            let _ = scope_tx.send(ctx.environments.clone());
            ctx.done.succeed();
            Ok(())
        }))
        .await
        .unwrap();

    let scope = scope_rx.await.unwrap();
    assert!(scope.is_closed());
    let err = scope.acquire().await.unwrap_err();
    assert!(matches!(err, EnvironmentError::ScopeClosed));
}

#[tokio::test]
async fn test_missing_fixture_fails_acquisition() {
    let runner = Runner::new(host());
    let failure = runner
        .execute(
            Run::new(|ctx: RunContext| async move {
                match ctx.environments.acquire().await {
                    Ok(_) => ctx.done.succeed(),
                    Err(e) => ctx
                        .done
                        .fail(TestError::new(e.to_string()).with_origin(ErrorOrigin::Setup)),
                }
                Ok(())
            })
            .with_fixture(Some("fixtures/absent.html".to_string())),
        )
        .await
        .unwrap_err();
    let error = failure.first_error().unwrap();
    assert_eq!(error.origin, ErrorOrigin::Setup);
    assert!(error.message.contains("fixtures/absent.html"));
}
