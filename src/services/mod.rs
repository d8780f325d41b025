//! Service layer modules for external integrations.

pub mod completion;

pub use completion::{CompletionGateway, ProviderKind, TextCompletion};
