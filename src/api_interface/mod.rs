pub mod compatible;
pub mod openai_api;
