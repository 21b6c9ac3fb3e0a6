pub mod browser;
pub mod db;
pub mod local_store;

pub use browser::WsFullscreenAdapter;
pub use db::DbAdapter;
pub use local_store::LocalStateAdapter;
