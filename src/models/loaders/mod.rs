pub mod event_loader;

pub use event_loader::load_inbox_events;
