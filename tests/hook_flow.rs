//! End-to-end tests for the hook chain driving workflow stages.

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::{Value, json};
use stagegate::Error;
use stagegate::engine::Engine;
use stagegate::hooks::{
    AggregateOutcome, BlockCause, Hook, HookContext, HookError, HookRegistry, HookResult,
    OperationRequest, StageGate,
};
use stagegate::storage::{MemoryStore, StorageProvider, keys};
use stagegate::workflow::{Stage, TransitionTable, WorkflowMachine};
use std::sync::Arc;
use std::time::Duration;

fn review_table() -> TransitionTable {
    TransitionTable::new(
        "draft",
        [
            (Stage::new("draft"), vec![Stage::new("review")]),
            (
                Stage::new("review"),
                vec![Stage::new("approved"), Stage::new("draft")],
            ),
        ],
    )
    .unwrap()
}

fn request(session_id: &str, operation: &str) -> OperationRequest {
    OperationRequest::new(session_id, operation, Value::Null)
}

/// Maps operation names to stage requests, the way a review tool would.
struct ReviewFlow;

#[async_trait]
impl Hook for ReviewFlow {
    fn name(&self) -> &str {
        "review-flow"
    }

    async fn evaluate(&self, ctx: &HookContext) -> Result<HookResult, HookError> {
        let result = match (ctx.stage().as_str(), ctx.operation()) {
            ("draft", "submit") => HookResult::transition("review"),
            ("review", "approve") => HookResult::transition("approved")
                .with_annotation("approved_by", ctx.payload()["user"].clone()),
            ("review", "reject") => HookResult::transition("draft"),
            _ => HookResult::allow(),
        };
        Ok(result)
    }
}

fn review_engine(store: Arc<MemoryStore>) -> Engine {
    let mut registry = HookRegistry::new();
    registry.register(
        Arc::new(
            StageGate::new("publish-gate", &["publish".to_string()], vec![Stage::new("approved")])
                .unwrap(),
        ),
        Some(0),
    );
    registry.register(Arc::new(ReviewFlow), None);
    Engine::new(WorkflowMachine::new(store, review_table()), registry)
}

#[tokio::test]
async fn draft_review_approved_scenario() {
    let store = Arc::new(MemoryStore::new());
    let engine = review_engine(Arc::clone(&store));

    // Publishing a draft is blocked and nothing is written.
    let outcome = engine.decide(request("doc-1", "publish")).await;
    let AggregateOutcome::Block(block) = &outcome else {
        panic!("expected Block, got {outcome:?}");
    };
    assert_eq!(block.cause, BlockCause::Hook);
    assert_eq!(block.hook.as_deref(), Some("publish-gate"));
    assert_eq!(store.raw_len(), 0);

    engine.process(request("doc-1", "submit")).await.unwrap();
    let outcome = engine
        .process(OperationRequest::new(
            "doc-1",
            "approve",
            json!({"user": "ana"}),
        ))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        AggregateOutcome::Allow {
            annotations: [("approved_by".to_string(), json!("ana"))].into(),
            stage: Some(Stage::new("approved")),
        }
    );

    let outcome = engine.decide(request("doc-1", "publish")).await;
    assert!(outcome.is_allowed());

    let state = engine.workflow().load("doc-1").await.unwrap();
    assert_eq!(state.current_stage, Stage::new("approved"));
    assert_eq!(state.history, vec![Stage::new("draft"), Stage::new("review")]);
    assert_eq!(state.metadata["approved_by"], json!("ana"));
}

#[tokio::test]
async fn sessions_are_isolated() {
    let engine = review_engine(Arc::new(MemoryStore::new()));

    engine.process(request("a", "submit")).await.unwrap();

    assert_eq!(
        engine.workflow().load("a").await.unwrap().current_stage,
        Stage::new("review")
    );
    assert_eq!(
        engine.workflow().load("b").await.unwrap().current_stage,
        Stage::new("draft")
    );
}

#[tokio::test]
async fn same_input_same_outcome() {
    let first = review_engine(Arc::new(MemoryStore::new()));
    let second = review_engine(Arc::new(MemoryStore::new()));

    for op in ["publish", "submit", "publish", "reject", "submit", "approve"] {
        let a = first.decide(request("s", op)).await;
        let b = second.decide(request("s", op)).await;
        assert_eq!(a, b, "diverged on {op}");
    }
}

/// Requests a fixed target for every operation.
struct Requester {
    name: &'static str,
    target: &'static str,
}

#[async_trait]
impl Hook for Requester {
    fn name(&self) -> &str {
        self.name
    }

    async fn evaluate(&self, _ctx: &HookContext) -> Result<HookResult, HookError> {
        Ok(HookResult::transition(self.target))
    }
}

#[tokio::test]
async fn conflicting_requests_block_without_writing() {
    let store = Arc::new(MemoryStore::new());
    let table = TransitionTable::new(
        "draft",
        [(
            Stage::new("draft"),
            vec![Stage::new("a"), Stage::new("b")],
        )],
    )
    .unwrap();
    let mut registry = HookRegistry::new();
    registry.register(Arc::new(Requester { name: "one", target: "a" }), None);
    registry.register(Arc::new(Requester { name: "two", target: "b" }), None);
    let engine = Engine::new(WorkflowMachine::new(store.clone(), table), registry);

    let err = engine.process(request("s", "op")).await.unwrap_err();
    assert!(matches!(err, Error::AmbiguousTransition { .. }));

    let outcome = engine.decide(request("s", "op")).await;
    let AggregateOutcome::Block(block) = outcome else {
        panic!("expected Block");
    };
    assert_eq!(block.cause, BlockCause::Rejected);
    assert_eq!(store.raw_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transitions_have_one_winner() {
    let table = TransitionTable::new(
        "draft",
        [(
            Stage::new("draft"),
            vec![Stage::new("a"), Stage::new("b")],
        )],
    )
    .unwrap();

    for round in 0..50 {
        let machine = Arc::new(WorkflowMachine::new(
            Arc::new(MemoryStore::new()),
            table.clone(),
        ));
        let session = format!("s-{round}");
        let draft = Stage::new("draft");

        let tasks: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|target| {
                let machine = Arc::clone(&machine);
                let session = session.clone();
                let draft = draft.clone();
                tokio::spawn(async move {
                    machine
                        .transition_from(&session, &draft, &Stage::new(target), Default::default())
                        .await
                })
            })
            .collect();

        let mut winners = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(state) => winners.push(state.current_stage),
                Err(Error::StageConflict { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(winners.len(), 1, "round {round}");
        let state = machine.load(&session).await.unwrap();
        assert_eq!(state.current_stage, winners[0]);
        assert_eq!(state.history, vec![draft]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_plain_transitions_have_one_winner() {
    // a and b are terminal, so whichever commits second finds no edge left.
    let table = TransitionTable::new(
        "draft",
        [(
            Stage::new("draft"),
            vec![Stage::new("a"), Stage::new("b")],
        )],
    )
    .unwrap();

    for round in 0..50 {
        let machine = Arc::new(WorkflowMachine::new(
            Arc::new(MemoryStore::new()),
            table.clone(),
        ));
        let session = format!("s-{round}");

        let tasks: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|target| {
                let machine = Arc::clone(&machine);
                let session = session.clone();
                tokio::spawn(async move { machine.transition(&session, &Stage::new(target)).await })
            })
            .collect();

        let mut winners = Vec::new();
        let mut illegal = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(state) => winners.push(state.current_stage),
                Err(Error::IllegalTransition { from, .. }) => {
                    assert_ne!(from, Stage::new("draft"), "round {round}");
                    illegal += 1;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(winners.len(), 1, "round {round}");
        assert_eq!(illegal, 1, "round {round}");
        let state = machine.load(&session).await.unwrap();
        assert_eq!(state.current_stage, winners[0]);
        assert_eq!(state.history, vec![Stage::new("draft")]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_do_not_interfere() {
    let engine = Arc::new(review_engine(Arc::new(MemoryStore::new())));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let id = format!("s-{i}");
                engine.process(request(&id, "submit")).await.unwrap();
                engine.process(request(&id, "approve")).await.unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let sessions = engine.workflow().list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 32);
    for session in sessions {
        let state = engine.workflow().load(&session.session_id).await.unwrap();
        assert_eq!(state.current_stage, Stage::new("approved"));
    }
}

#[tokio::test]
async fn idle_session_expires() {
    let store = Arc::new(MemoryStore::new());
    let machine = WorkflowMachine::new(store, review_table())
        .with_session_ttl(Some(Duration::from_millis(50)));

    machine.transition("s", &Stage::new("review")).await.unwrap();
    assert!(machine.load("s").await.unwrap().persisted);

    tokio::time::sleep(Duration::from_millis(120)).await;

    let state = machine.load("s").await.unwrap();
    assert!(!state.persisted);
    assert_eq!(state.current_stage, Stage::new("draft"));
}

const STAGES: [&str; 4] = ["draft", "review", "approved", "archived"];

fn legal(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        ("draft", "review") | ("review", "approved" | "draft")
    )
}

proptest! {
    #[test]
    fn transitions_follow_the_table(path in prop::collection::vec(0..STAGES.len(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let table = TransitionTable::new(
                "draft",
                [
                    (Stage::new("draft"), vec![Stage::new("review")]),
                    (Stage::new("review"), vec![Stage::new("approved"), Stage::new("draft")]),
                    (Stage::new("archived"), vec![]),
                ],
            )
            .unwrap();
            let machine = WorkflowMachine::new(store.clone(), table);
            let key = keys::workflow("p");

            for index in path {
                let target = STAGES[index];
                let before = machine.load("p").await.unwrap();
                let raw_before = store.get(&key).await.unwrap();

                let result = machine.transition("p", &Stage::new(target)).await;

                if legal(before.current_stage.as_str(), target) {
                    let after = result.unwrap();
                    assert_eq!(after.current_stage.as_str(), target);
                    assert_eq!(after.history.last(), Some(&before.current_stage));
                    assert_eq!(after.history.len(), before.history.len() + 1);
                } else {
                    assert!(matches!(result, Err(Error::IllegalTransition { .. })));
                    assert_eq!(store.get(&key).await.unwrap(), raw_before);
                }
            }
        });
    }
}
