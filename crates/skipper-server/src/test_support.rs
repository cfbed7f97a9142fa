//! Shared fixtures for route tests: a seeded world backed by a temp
//! database, recording capability doubles and a scripted LM.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use skipper_core::config::Config;
use skipper_core::llm::{ChatMessage, LanguageModel, ModelProvider, StreamPart};
use skipper_core::scheduler::LocalScheduler;
use skipper_core::services::testing::{RecordingDeployer, RecordingSqlExecutor, StaticBilling};
use skipper_core::services::Services;
use skipper_core::storage::{
    AiBinding, AiBindingStore, AppStore, ConversationStore, Database, DatabaseServiceStore,
    ExecutionSignals, ExecutionStore, OrgRole, OrgStore, ProjectStore, StoredMessage,
};
use skipper_core::tools::{build_registry, AdvertisedTool, ToolContext};

use crate::auth::{CurrentPrincipal, Principal};
use crate::routes::chat::{build_transcript, run_chat_pipeline, ChatPipeline};
use crate::types::ChatEvent;
use crate::AppState;

/// LM double replaying queued scripts in order. When the queue is empty a
/// completion yields no output.
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Vec<StreamPart>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_script(&self, parts: Vec<StreamPart>) {
        self.scripts.lock().unwrap().push_back(parts);
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn stream_chat(
        &self,
        _messages: Vec<ChatMessage>,
        _tools: Vec<AdvertisedTool>,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![StreamPart::Done]);
        let (tx, rx) = mpsc::unbounded_channel();
        for part in script {
            let _ = tx.send(part);
        }
        Ok(rx)
    }
}

struct ScriptedProvider {
    model: Arc<ScriptedModel>,
}

impl ModelProvider for ScriptedProvider {
    fn model_for(&self, _binding: &AiBinding) -> Arc<dyn LanguageModel> {
        self.model.clone()
    }
}

pub struct TestWorld {
    pub state: AppState,
    pub model: Arc<ScriptedModel>,
    pub deployer: Arc<RecordingDeployer>,
    pub sql: Arc<RecordingSqlExecutor>,
    pub user_id: String,
    pub org_id: String,
    pub project_id: String,
    pub environment_id: String,
    pub application_id: String,
    pub database_id: String,
    pub ai_id: String,
    last_conversation: Mutex<Option<String>>,
    db_path: Arc<PathBuf>,
    _dir: TempDir,
}

impl TestWorld {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = Arc::new(dir.path().join("test.db"));
        let db = Database::new(&db_path).unwrap();

        let orgs = OrgStore::new(&db);
        let org_id = orgs.create_organization("acme").unwrap();
        let user_id = orgs.create_user("alice@acme.io", "Alice").unwrap();
        orgs.add_member(&user_id, &org_id, OrgRole::Owner).unwrap();

        let projects = ProjectStore::new(&db);
        let project_id = projects.create(&org_id, "web", None).unwrap();
        let environment_id = projects.create_environment(&project_id, "production").unwrap();
        let application_id = AppStore::new(&db)
            .create_application(&environment_id, "api")
            .unwrap();
        let database_id = DatabaseServiceStore::new(&db)
            .create(&environment_id, "postgres", "main-db", "appdb", "app", "pg-secret")
            .unwrap();
        let ai_id = AiBindingStore::new(&db)
            .create(&org_id, "default", "https://llm.example/v1/chat/completions", "sk-test", "skipper-lm")
            .unwrap();

        let deployer = Arc::new(RecordingDeployer::default());
        let sql = Arc::new(RecordingSqlExecutor::default());
        let model = Arc::new(ScriptedModel::new());

        let services = Arc::new(Services {
            deployer: deployer.clone(),
            sql: sql.clone(),
            scheduler: Arc::new(LocalScheduler::new()),
            billing: Arc::new(StaticBilling),
            config: Arc::new(Config::default()),
        });

        let state = AppState {
            db_path: db_path.clone(),
            config: Arc::new(Config::default()),
            services,
            registry: Arc::new(build_registry().unwrap()),
            signals: Arc::new(ExecutionSignals::new()),
            models: Arc::new(ScriptedProvider {
                model: model.clone(),
            }),
        };

        Self {
            state,
            model,
            deployer,
            sql,
            user_id,
            org_id,
            project_id,
            environment_id,
            application_id,
            database_id,
            ai_id,
            last_conversation: Mutex::new(None),
            db_path,
            _dir: dir,
        }
    }

    pub fn script(&self, parts: Vec<StreamPart>) {
        self.model.push_script(parts);
    }

    pub fn db(&self) -> Database {
        Database::new(&self.db_path).unwrap()
    }

    pub fn principal(&self) -> CurrentPrincipal {
        CurrentPrincipal(Principal {
            user_id: self.user_id.clone(),
            organization_id: self.org_id.clone(),
            project_id: None,
            server_id: None,
        })
    }

    pub fn foreign_principal(&self) -> CurrentPrincipal {
        let db = self.db();
        let orgs = OrgStore::new(&db);
        let org = orgs.create_organization("rival").unwrap();
        let user = orgs.create_user("mallory@rival.io", "Mallory").unwrap();
        orgs.add_member(&user, &org, OrgRole::Owner).unwrap();
        CurrentPrincipal(Principal {
            user_id: user,
            organization_id: org,
            project_id: None,
            server_id: None,
        })
    }

    pub fn tool_context(&self) -> ToolContext {
        self.principal().0.tool_context(&self.state)
    }

    pub fn create_conversation(&self) -> String {
        let db = self.db();
        let id = ConversationStore::new(&db)
            .create(&self.user_id, &self.org_id, &self.ai_id, None, None, "test")
            .unwrap();
        *self.last_conversation.lock().unwrap() = Some(id.clone());
        id
    }

    pub fn create_pending_execution(&self, tool_name: &str, arguments: serde_json::Value) -> String {
        let conversation_id = self.create_conversation();
        let db = self.db();
        ExecutionStore::new(&db)
            .create_pending(&conversation_id, "tc-test", tool_name, &arguments)
            .unwrap()
    }

    /// Prepare a chat pipeline the way the route does: user message,
    /// assistant placeholder, rebuilt transcript.
    pub fn chat_pipeline(&self, message: &str) -> (ChatPipeline, Vec<ChatMessage>) {
        let conversation_id = self.create_conversation();
        let db = self.db();
        let store = ConversationStore::new(&db);
        store
            .append_message(&conversation_id, "user", Some(message), None, "sent")
            .unwrap();
        let assistant_message_id = store
            .append_message(&conversation_id, "assistant", Some(""), None, "sending")
            .unwrap();
        let transcript = build_transcript(&store.list_messages(&conversation_id).unwrap());

        (
            ChatPipeline {
                registry: self.state.registry.clone(),
                model: self.model.clone(),
                ctx: self.tool_context(),
                conversation_id,
                assistant_message_id,
            },
            transcript,
        )
    }

    /// Run the chat pipeline to completion and collect its events.
    pub async fn run_chat(&self, message: &str) -> Vec<ChatEvent> {
        let (pipeline, transcript) = self.chat_pipeline(message);
        let (tx, mut rx) = mpsc::channel(256);
        run_chat_pipeline(pipeline, transcript, tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn conversation_messages(&self) -> Vec<StoredMessage> {
        let id = self
            .last_conversation
            .lock()
            .unwrap()
            .clone()
            .expect("no conversation created yet");
        self.messages_for(&id)
    }

    pub fn messages_for(&self, conversation_id: &str) -> Vec<StoredMessage> {
        let db = self.db();
        ConversationStore::new(&db)
            .list_messages(conversation_id)
            .unwrap()
    }
}

pub fn collect_events(events: &[ChatEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}
