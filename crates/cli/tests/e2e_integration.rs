//! End-to-end tests for the clinic assistant.
//!
//! These run the orchestrator against a real gateway over HTTP, backed by
//! JSON files in a temporary directory, with a scripted model in place of
//! the language model.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use clinicdesk_actions::default_registry;
use clinicdesk_agent::{NoopObserver, Orchestrator, Termination};
use clinicdesk_core::error::ProviderError;
use clinicdesk_core::message::{ConversationState, Role, TurnKind};
use clinicdesk_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use clinicdesk_core::record::{RecordStore, ResourceKind};
use clinicdesk_gateway::{GatewayState, build_router};
use clinicdesk_store::{FileRecordStore, HttpRecordStore};
use serde_json::{Value, json};
use tokio::sync::mpsc;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Streams scripted replies in sequence, a few characters per chunk.
struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Done.".into());

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let chars: Vec<char> = reply.chars().collect();
            for piece in chars.chunks(7) {
                let text: String = piece.iter().collect();
                if tx.send(Ok(StreamChunk::text(text))).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(StreamChunk::end())).await;
        });
        Ok(rx)
    }
}

fn block(params: Value) -> String {
    format!("<tool_block>\n<params>\n{params}\n</params>\n</tool_block>")
}

// ── Harness ──────────────────────────────────────────────────────────────

/// A gateway over `data_dir` on an ephemeral port; returns its base URL.
async fn spawn_gateway(data_dir: &Path) -> String {
    let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::new(data_dir));
    let idle = Arc::new(Orchestrator::new(
        Arc::new(ScriptedProvider::new(&[])),
        Arc::new(default_registry(store.clone())),
        "unused",
    ));
    let app = build_router(GatewayState::new(store, idle));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn assistant_over(url: &str, provider: Arc<ScriptedProvider>) -> Orchestrator {
    let store: Arc<dyn RecordStore> = Arc::new(HttpRecordStore::new(url));
    Orchestrator::new(provider, Arc::new(default_registry(store)), "e2e-model")
}

fn bundle(data_dir: &Path, kind: ResourceKind) -> Value {
    let path = data_dir.join(format!("{}.json", kind.collection()));
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn assistant_registers_patient_through_the_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_gateway(dir.path()).await;

    let provider = Arc::new(ScriptedProvider::new(&[
        &format!(
            "I'll register Jane now.\n{}\nThis trailing text is never read.",
            block(json!({
                "tool": "create_patient",
                "firstName": "Jane",
                "lastName": "Doe",
                "birthDate": "1990-01-15",
                "gender": "female"
            }))
        ),
        "Jane Doe has been registered.",
    ]));
    let assistant = assistant_over(&url, provider.clone());

    let outcome = assistant
        .submit(
            ConversationState::new(),
            "Register Jane Doe, born 1990-01-15, female",
            &NoopObserver,
        )
        .await;

    assert_eq!(outcome.report.termination, Termination::Done);
    assert_eq!(outcome.report.actions_executed, 1);
    assert_eq!(provider.calls(), 2);

    let patients = bundle(dir.path(), ResourceKind::Patients);
    assert_eq!(patients["resourceType"], "Bundle");
    assert_eq!(patients["total"], 1);
    let patient = &patients["entry"][0]["resource"];
    assert_eq!(patient["resourceType"], "Patient");
    assert_eq!(patient["name"][0]["family"], "Doe");
    assert_eq!(patient["birthDate"], "1990-01-15");

    let turns = &outcome.conversation.turns;
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[2].role, Role::User);
    assert_eq!(turns[2].kind, TurnKind::ToolResults);
    assert!(turns[2].text.starts_with("[Tool Result: create_patient]"));
    assert!(!turns[1].text.contains("never read"));
}

#[tokio::test]
async fn appointment_links_existing_records_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_gateway(dir.path()).await;
    let records = HttpRecordStore::new(&url);

    records
        .create(
            ResourceKind::Patients,
            json!({
                "id": "pat-jane",
                "name": [{ "use": "official", "given": ["Jane"], "family": "Doe" }]
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
        .await
        .unwrap();
    records
        .create(
            ResourceKind::Practitioners,
            json!({
                "id": "pra-house",
                "name": [{ "use": "official", "prefix": ["Dr."], "given": ["Gregory"], "family": "House" }]
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
        .await
        .unwrap();

    let provider = Arc::new(ScriptedProvider::new(&[
        &block(json!({
            "action": "create_appointment",
            "patientId": "pat-jane",
            "practitionerId": "pra-house",
            "start": "2026-11-02T09:00:00Z",
            "end": "2026-11-02T09:30:00Z",
            "description": "Annual checkup"
        })),
        "Booked.",
    ]));
    let assistant = assistant_over(&url, provider);

    let outcome = assistant
        .submit(ConversationState::new(), "Book Jane with Dr. House", &NoopObserver)
        .await;
    assert_eq!(outcome.report.actions_executed, 1);

    let appointments = records.list(ResourceKind::Appointments).await.unwrap();
    assert_eq!(appointments.len(), 1);
    let participants = appointments[0]["participant"].as_array().unwrap();
    assert_eq!(participants[0]["actor"]["reference"], "Patient/pat-jane");
    assert_eq!(participants[0]["actor"]["display"], "Jane Doe");
    assert_eq!(participants[1]["actor"]["display"], "Dr. Gregory House");
    assert_eq!(appointments[0]["status"], "booked");
}

#[tokio::test]
async fn failed_action_is_reported_back_and_nothing_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_gateway(dir.path()).await;

    let provider = Arc::new(ScriptedProvider::new(&[
        &block(json!({ "tool": "update_condition", "id": "con-missing", "note": "resolved" })),
        "That condition doesn't exist.",
    ]));
    let assistant = assistant_over(&url, provider.clone());

    let outcome = assistant
        .submit(ConversationState::new(), "Mark it resolved", &NoopObserver)
        .await;

    assert_eq!(outcome.report.termination, Termination::Done);
    let results = &outcome.conversation.turns[2].text;
    assert!(results.starts_with("[Tool Error: update_condition]"));
    assert!(
        HttpRecordStore::new(&url)
            .list(ResourceKind::Conditions)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn conversation_continues_across_messages() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_gateway(dir.path()).await;

    let provider = Arc::new(ScriptedProvider::new(&[
        "Hello! How can I help?",
        &block(json!({ "tool": "list_resources", "resourceType": "patients" })),
        "There are no patients yet.",
    ]));
    let assistant = assistant_over(&url, provider.clone());

    let first = assistant
        .submit(ConversationState::new(), "hi", &NoopObserver)
        .await;
    let second = assistant
        .submit(first.conversation, "how many patients?", &NoopObserver)
        .await;

    assert_eq!(provider.calls(), 3);
    assert_eq!(second.conversation.len(), 6);
    let results = &second.conversation.turns[4].text;
    assert!(results.contains("\"totalCount\": 0"));
}
