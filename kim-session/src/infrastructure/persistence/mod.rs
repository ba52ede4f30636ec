pub mod lua;
pub mod redis_repository;

pub use redis_repository::RedisSessionRepository;
