pub mod db;
pub mod mailer;
pub mod storage;

pub use db::DbAdapter;
pub use mailer::HttpMailNotifier;
pub use storage::LocalFileStorage;
