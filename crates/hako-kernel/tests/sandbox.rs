//! End-to-end tests of the sandbox engine: continuation behavior, process
//! lifecycle, and the background loop, driven through the CalcExecutor.

use std::sync::Arc;
use std::time::Duration;

use hako_kernel::{
    BufferSink, CalcExecutor, ExecError, MemoryFiles, Sandbox, SandboxConfig, StaticModules,
    Value,
};

fn sandbox(name: &str) -> Sandbox {
    Sandbox::with_collaborators(
        Arc::new(CalcExecutor::new()),
        SandboxConfig::named(name),
        &StaticModules::host_defaults(),
        Arc::new(MemoryFiles::new()),
        Arc::new(BufferSink::new()),
    )
}

#[tokio::test]
async fn repl_scenario() {
    let sb = sandbox("scenario");

    assert!(sb.execute("x = 5").await.ok());
    assert_eq!(sb.execute("x + 1").await.value(), Some(&Value::Int(6)));

    let fault = sb.execute("1/0").await;
    assert!(matches!(fault.error(), Some(ExecError::Runtime(_))));

    // prior bindings survive the fault
    let vars = sb.variables().await;
    assert_eq!(vars.len(), 1);
    assert_eq!(vars[0].name, "x");
    assert_eq!(vars[0].ty, "int");
}

#[tokio::test]
async fn continuation_equivalence() {
    let stepwise = sandbox("stepwise");
    stepwise.execute("a = 2").await;
    stepwise.execute("b = a + 3").await;
    let step_result = stepwise.execute("a + b").await;

    let batched = sandbox("batched");
    let batch_result = batched.execute("a = 2; b = a + 3; a + b").await;

    assert_eq!(step_result.value(), batch_result.value());
    assert_eq!(stepwise.variables().await, batched.variables().await);
}

#[tokio::test]
async fn nested_submission_wins_the_commit() {
    let sb = Arc::new(sandbox("reentrant"));

    // Outer submission is still evaluating when the nested one lands.
    let outer = {
        let sb = sb.clone();
        tokio::spawn(async move { sb.execute("sleep 100; y = 1").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sb.execute("x = 2").await.ok());

    let outer_result = outer.await.unwrap();
    assert!(outer_result.ok());

    // The final shared context reflects the nested call, not the outer
    // call's stale snapshot.
    let names: Vec<String> = sb.variables().await.into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["x"]);
}

#[tokio::test]
async fn spawned_bindings_never_reach_the_repl() {
    let sb = sandbox("isolation");
    sb.execute("visible = 1").await;

    let pid = sb.spawn("secret = 2; secret * 10").await.unwrap();
    let result = sb.wait(pid).await.unwrap();
    assert_eq!(result.value(), Some(&Value::Int(20)));

    let names: Vec<String> = sb.variables().await.into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["visible"]);
}

#[tokio::test]
async fn spawn_kill_wait_reports_cancelled() {
    let sb = Arc::new(sandbox("kill"));
    let pid = sb.spawn("loop").await.unwrap();

    let waiter = {
        let sb = sb.clone();
        tokio::spawn(async move { sb.wait(pid).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(sb.kill(pid).await);
    assert!(sb.status(pid).await.is_none());

    let result = waiter.await.unwrap().unwrap();
    assert_eq!(result.error(), Some(&ExecError::Cancelled));
}

#[tokio::test]
async fn loop_reclaims_exited_processes() {
    let sb = sandbox("reaper");
    sb.run_idle().await.unwrap();
    assert!(sb.is_running());
    assert!(matches!(
        sb.run_idle().await,
        Err(hako_kernel::SandboxError::AlreadyRunning)
    ));

    let pid = sb.spawn("1 + 1").await.unwrap();

    // The reclamation pass removes the exited entry within a few ticks.
    let mut reclaimed = false;
    for _ in 0..50 {
        if sb.status(pid).await.is_none() {
            reclaimed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reclaimed);

    sb.stop().await;
    sb.wait_for_stop().await;
    assert!(!sb.is_running());
}

#[tokio::test]
async fn independent_sandboxes_do_not_share_state() {
    let a = sandbox("a");
    let b = sandbox("b");

    a.execute("x = 1").await;
    b.execute("x = 2").await;

    assert_eq!(a.variables().await[0].value, Value::Int(1));
    assert_eq!(b.variables().await[0].value, Value::Int(2));

    // pid allocators are per-sandbox, both starting at 1
    let pa = a.spawn("1").await.unwrap();
    let pb = b.spawn("1").await.unwrap();
    assert_eq!(pa, pb);
}

#[tokio::test]
async fn manifest_governs_imports_everywhere() {
    let sb = sandbox("caps");

    assert!(sb.execute("import collections").await.ok());
    let denied = sb.execute("import fs").await;
    assert!(matches!(denied.error(), Some(ExecError::Compile(_))));

    // Spawned units run under the same manifest.
    let pid = sb.spawn("import proc").await.unwrap();
    let result = sb.wait(pid).await.unwrap();
    assert!(matches!(result.error(), Some(ExecError::Compile(_))));
}

#[tokio::test]
async fn file_backed_submissions() {
    let files = Arc::new(MemoryFiles::new());
    files.insert("/startup.hako", "base = 10");
    files.insert("/job.hako", "sleep 5; 3 * 3");
    let sb = Sandbox::with_collaborators(
        Arc::new(CalcExecutor::new()),
        SandboxConfig::named("files"),
        &StaticModules::host_defaults(),
        files,
        Arc::new(BufferSink::new()),
    );

    assert!(sb.execute_file(std::path::Path::new("/startup.hako")).await.ok());
    assert_eq!(
        sb.execute("base + 1").await.value(),
        Some(&Value::Int(11))
    );

    let pid = sb
        .spawn_file(std::path::Path::new("/job.hako"))
        .await
        .unwrap();
    let result = sb.wait(pid).await.unwrap();
    assert_eq!(result.value(), Some(&Value::Int(9)));
}
