pub mod service;

pub use service::SessionAppService;
