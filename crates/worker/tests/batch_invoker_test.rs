use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use taskd_core::{BatchRow, BatchRowStatus, Result, SchedulerError};
use taskd_worker::{BatchCall, BatchInvoker, CallResponse};

/// 按预设脚本逐次返回响应的调用桩
struct ScriptedCaller {
    /// 每行一个脚本，按row_id索引；脚本耗尽后重复最后一项
    scripts: Mutex<std::collections::HashMap<String, Vec<ScriptStep>>>,
    total_calls: AtomicUsize,
}

#[derive(Clone)]
enum ScriptStep {
    Status(u16, &'static str),
    Transport,
}

impl ScriptedCaller {
    fn new(scripts: Vec<(&str, Vec<ScriptStep>)>) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(id, steps)| (id.to_string(), steps))
                    .collect(),
            ),
            total_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BatchCall for ScriptedCaller {
    async fn call(
        &self,
        _endpoint: &str,
        _api_key: Option<&str>,
        row: &BatchRow,
    ) -> Result<CallResponse> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            let steps = scripts.get_mut(&row.row_id).expect("未知的row_id");
            if steps.len() > 1 {
                steps.remove(0)
            } else {
                steps[0].clone()
            }
        };
        match step {
            ScriptStep::Status(status, body) => Ok(CallResponse {
                status,
                body: body.to_string(),
            }),
            ScriptStep::Transport => Err(SchedulerError::Network("连接被拒绝".to_string())),
        }
    }
}

fn row(id: &str) -> BatchRow {
    BatchRow::new(id.to_string(), "cases.csv".to_string(), 0, json!({"column_0": id}))
}

const OK_BODY: &str = r#"{"data": {"outputs": {"RES": "ok"}}}"#;

#[tokio::test]
async fn test_all_rows_reach_terminal_state() {
    let caller = Arc::new(ScriptedCaller::new(vec![
        ("C1", vec![ScriptStep::Status(200, OK_BODY)]),
        ("C2", vec![ScriptStep::Status(500, "err")]),
        ("C3", vec![ScriptStep::Status(200, OK_BODY)]),
    ]));
    let invoker = BatchInvoker::new(caller);

    let rows = invoker
        .invoke_batch(
            "http://api/call",
            None,
            vec![row("C1"), row("C2"), row("C3")],
            1,
            Duration::from_millis(1),
        )
        .await;

    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.is_terminal()));
    assert_eq!(rows[0].status, BatchRowStatus::Success);
    assert_eq!(rows[1].status, BatchRowStatus::Failed);
    assert_eq!(rows[2].status, BatchRowStatus::Success);
}

#[tokio::test]
async fn test_retry_budget_is_max_retries_plus_one() {
    let caller = Arc::new(ScriptedCaller::new(vec![(
        "C1",
        vec![ScriptStep::Status(503, "busy")],
    )]));
    let invoker = BatchInvoker::new(caller.clone());

    let rows = invoker
        .invoke_batch(
            "http://api/call",
            None,
            vec![row("C1")],
            2,
            Duration::from_millis(1),
        )
        .await;

    assert_eq!(rows[0].status, BatchRowStatus::Failed);
    assert_eq!(rows[0].attempts, 3);
    assert_eq!(caller.total_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_error_does_not_retry() {
    let caller = Arc::new(ScriptedCaller::new(vec![(
        "C1",
        vec![ScriptStep::Status(400, "bad request")],
    )]));
    let invoker = BatchInvoker::new(caller.clone());

    let rows = invoker
        .invoke_batch(
            "http://api/call",
            None,
            vec![row("C1")],
            5,
            Duration::from_millis(1),
        )
        .await;

    assert_eq!(rows[0].status, BatchRowStatus::Failed);
    assert_eq!(rows[0].attempts, 1);
    assert_eq!(caller.total_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transport_error_then_success() {
    let caller = Arc::new(ScriptedCaller::new(vec![(
        "C1",
        vec![ScriptStep::Transport, ScriptStep::Status(200, OK_BODY)],
    )]));
    let invoker = BatchInvoker::new(caller);

    let rows = invoker
        .invoke_batch(
            "http://api/call",
            None,
            vec![row("C1")],
            2,
            Duration::from_millis(1),
        )
        .await;

    assert_eq!(rows[0].status, BatchRowStatus::Success);
    assert_eq!(rows[0].attempts, 2);
    assert_eq!(rows[0].parsed_result, Some(json!("ok")));
    assert_eq!(rows[0].response.as_deref(), Some(OK_BODY));
}

#[tokio::test]
async fn test_exhausted_row_does_not_block_remaining_rows() {
    let caller = Arc::new(ScriptedCaller::new(vec![
        ("C1", vec![ScriptStep::Transport]),
        ("C2", vec![ScriptStep::Status(200, OK_BODY)]),
    ]));
    let invoker = BatchInvoker::new(caller);

    let rows = invoker
        .invoke_batch(
            "http://api/call",
            None,
            vec![row("C1"), row("C2")],
            1,
            Duration::from_millis(1),
        )
        .await;

    assert_eq!(rows[0].status, BatchRowStatus::Failed);
    assert!(rows[0].error_message.is_some());
    assert_eq!(rows[1].status, BatchRowStatus::Success);
}
