pub mod documentation;
pub mod health_service;
pub mod live_service;
pub mod scoring;
pub mod session_service;
pub mod storage_supervisor;
pub mod websocket_service;
