/// Data models for accounts, sessions and login auditing
pub mod login_audit;
pub mod requests;
pub mod session;
pub mod user;

pub use login_audit::{LoginAuditEntry, NewLoginAudit};
pub use session::{ClientInfo, NewSession, Session};
pub use user::{
    Identity, NewUser, Page, PageRequest, ProductAssociation, Role, Status, User, UserChanges,
    UserFilter,
};
