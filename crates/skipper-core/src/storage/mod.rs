//! Persistence layer
//!
//! SQLite-based storage for:
//! - Multi-tenant domain entities (projects through servers)
//! - Conversations and their message log
//! - Pending tool-executions and their approval lifecycle
//! - Per-organization AI policies

mod ai;
mod apps;
mod backups;
mod conversations;
mod database;
mod databases;
mod executions;
mod integrations;
mod mounts;
mod network;
mod orgs;
mod projects;
mod servers;

pub use ai::{AiBinding, AiBindingMasked, AiBindingStore};
pub use apps::{
    masked_application_payload, AppStore, Application, ComposeStack, SecurityRule,
    SecurityRuleMasked,
};
pub use backups::{Backup, BackupStore, Deployment, Schedule, VolumeBackup};
pub use conversations::{title_from_content, Conversation, ConversationStore, StoredMessage};
pub use database::Database;
pub use databases::{
    DatabaseService, DatabaseServiceMasked, DatabaseServiceStore, DATABASE_KINDS,
};
pub use executions::{
    DecisionOutcome, ExecutionSignals, ExecutionStatus, ExecutionStore, ToolExecution,
};
pub use integrations::{
    Certificate, CertificateMasked, Destination, DestinationMasked, GitProvider,
    GitProviderMasked, IntegrationStore, NotificationChannel, NotificationChannelMasked, Registry,
    RegistryMasked,
};
pub use mounts::{Mount, MountStore, NewMount};
pub use network::{DomainEntry, NetworkStore, PortMapping};
pub use orgs::{OrgMember, OrgRole, OrgStore, User};
pub use projects::{Environment, Project, ProjectStore};
pub use servers::{Server, ServerStore, SshKey, SshKeyMasked};
