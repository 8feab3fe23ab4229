//! Concierge Channels - messaging-platform adapters for the concierge.
//!
//! This crate provides:
//! - The WhatsApp Business Cloud API client
//! - The phone number to apartment registry
//! - Webhook verification and inbound message processing

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod registry;
pub mod traits;
pub mod webhook;
pub mod whatsapp;

pub use registry::{normalize_phone, GuestPhoneRegistry, RegisteredGuest, RegistryEntry};
pub use traits::{ChannelError, ChannelResult, MessageHandler, MessageSender};
pub use webhook::{verify_hub_signature, VerifyOutcome, WebhookProcessor, WebhookStatus};
pub use whatsapp::{parse_webhook_payload, InboundMessage, WhatsAppClient};
