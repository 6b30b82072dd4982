pub mod db;
pub mod email;
pub mod generator_llm;
pub mod whatsapp;

pub use db::DbAdapter;
pub use email::HttpEmailAdapter;
pub use generator_llm::OpenAiGeneratorAdapter;
pub use whatsapp::GraphApiWhatsAppAdapter;
