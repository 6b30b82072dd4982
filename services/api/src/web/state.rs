//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use vocab_delivery_core::ports::{
    DeliveryStore, EmailService, WhatsAppService, WordGenerationService,
};

//=========================================================================================
// AppState (Shared Across All Handlers and Background Tasks)
//=========================================================================================

/// The shared application state, created once at startup and passed to all
/// handlers and background loops.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DeliveryStore>,
    pub config: Arc<Config>,
    pub generator: Arc<dyn WordGenerationService>,
    pub whatsapp: Arc<dyn WhatsAppService>,
    pub email: Arc<dyn EmailService>,
}
