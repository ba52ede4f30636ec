pub mod service;

pub use service::PushAppService;
