use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::message::IrcMessage;

/// Where the session stands in the registration handshake. Commands are
/// only dispatched when they are registered for the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Connection open, NICK/USER/PASS not yet complete.
    PreAuthentication,
    /// NICK/USER/PASS done but a CAP negotiation still holds the
    /// welcome burst back.
    Authenticated,
    /// Fully registered; the whole command surface is available.
    CapsNegotiated,
}

/// Which stages a command is reachable from.
#[derive(Debug, Clone, Copy)]
pub struct Visibility {
    pub pre_auth: bool,
    pub post_auth: bool,
    pub post_caps: bool,
}

impl Visibility {
    pub const ALL: Visibility = Visibility {
        pre_auth: true,
        post_auth: true,
        post_caps: true,
    };
    pub const POST_CAPS_ONLY: Visibility = Visibility {
        pre_auth: false,
        post_auth: false,
        post_caps: true,
    };
}

pub type Handler =
    Arc<dyn Fn(IrcMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Command tables, one per stage. A lookup miss means the caller should
/// answer with ERR_UNKNOWNCOMMAND.
#[derive(Default)]
pub struct CommandRegistry {
    pre_auth: HashMap<String, Handler>,
    post_auth: HashMap<String, Handler>,
    post_caps: HashMap<String, Handler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its exact command name. Lookup is
    /// case-sensitive; callers register upper-case verbs.
    pub fn register(&mut self, command: &str, visibility: Visibility, handler: Handler) {
        let command = command.to_owned();
        if visibility.pre_auth
            && self
                .pre_auth
                .insert(command.clone(), handler.clone())
                .is_some()
        {
            log::warn!("re-registering pre-auth handler for {command}");
        }
        if visibility.post_auth
            && self
                .post_auth
                .insert(command.clone(), handler.clone())
                .is_some()
        {
            log::warn!("re-registering post-auth handler for {command}");
        }
        if visibility.post_caps
            && self.post_caps.insert(command.clone(), handler).is_some()
        {
            log::warn!("re-registering post-caps handler for {command}");
        }
    }

    pub fn get(&self, stage: AuthStage, command: &str) -> Option<&Handler> {
        let table = match stage {
            AuthStage::PreAuthentication => &self.pre_auth,
            AuthStage::Authenticated => &self.post_auth,
            AuthStage::CapsNegotiated => &self.post_caps,
        };
        table.get(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> Handler {
        Arc::new(move |_msg| -> Pin<Box<dyn Future<Output = ()> + Send>> {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_stage_visibility() {
        let mut registry = CommandRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.register("JOIN", Visibility::POST_CAPS_ONLY, counting_handler(count.clone()));

        assert!(registry.get(AuthStage::PreAuthentication, "JOIN").is_none());
        assert!(registry.get(AuthStage::Authenticated, "JOIN").is_none());
        assert!(registry.get(AuthStage::CapsNegotiated, "join").is_none());

        let handler = registry
            .get(AuthStage::CapsNegotiated, "JOIN")
            .cloned()
            .unwrap();
        handler(crate::message::IrcMessage::parse("JOIN #a").unwrap()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_last() {
        let mut registry = CommandRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        registry.register("PING", Visibility::ALL, counting_handler(first.clone()));
        registry.register("PING", Visibility::ALL, counting_handler(second.clone()));

        let handler = registry
            .get(AuthStage::PreAuthentication, "PING")
            .cloned()
            .unwrap();
        handler(crate::message::IrcMessage::parse("PING").unwrap()).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
