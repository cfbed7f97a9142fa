//! Safety and policy primitives composed inside tool bodies:
//! org-membership gates, resource-org binding, the bind-mount allowlist,
//! the SQL classifier and shell quoting.

pub mod access;
pub mod bind_mount;
pub mod shell;
pub mod sql;

pub use access::{ensure_org_binding, require_org_member, require_org_owner};
pub use bind_mount::{is_path_allowed, normalize_posix_path, remediation_steps};
pub use shell::shell_quote;
