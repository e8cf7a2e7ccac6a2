pub mod kanban;
pub mod pipeline;
pub mod request;
pub mod response;
