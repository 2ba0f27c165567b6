use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use {
    futures::FutureExt,
    hal_auth::Authorizer,
    hal_channels::ChatGateway,
    hal_common::types::{BotIdentity, InboundMessage},
    hal_config::BotConfig,
    hal_plugins::{PluginContext, PluginRegistry, RegisteredPlugin},
    rand::seq::IndexedRandom,
    regex::Regex,
    tracing::{debug, error, warn},
};

use crate::matching::{MatchInput, compile_passive, eligible, passive_matches, strip_prefix};

/// Routing knobs taken from the `[bot]` config section.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub prefix: String,
    pub fallback_replies: Vec<String>,
}

impl From<&BotConfig> for DispatcherOptions {
    fn from(bot: &BotConfig) -> Self {
        Self {
            prefix: bot.command_prefix.clone(),
            fallback_replies: bot.fallback_replies.clone(),
        }
    }
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self::from(&BotConfig::default())
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An active trigger matched and its plugin ran.
    Command { plugin: String, trigger: String },
    /// An active trigger matched but the sender lacks the permission.
    Denied { plugin: String, trigger: String },
    /// No active trigger matched; passive handlers ran `invocations` times.
    Passive { invocations: usize, handled: bool },
    /// The bot was addressed and nothing handled the message.
    Fallback,
}

/// Routes inbound messages to plugins.
///
/// Shared across per-message tasks; all state is read-only after
/// construction.
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    authorizer: Option<Arc<Authorizer>>,
    gateway: Arc<dyn ChatGateway>,
    identity: BotIdentity,
    options: DispatcherOptions,
    passive: HashMap<String, Regex>,
    ctx: PluginContext,
}

impl Dispatcher {
    /// Build a dispatcher over the plugins in `ctx.registry`. Passive
    /// patterns are compiled once here; invalid ones are logged and never
    /// fire.
    pub fn new(
        ctx: PluginContext,
        gateway: Arc<dyn ChatGateway>,
        identity: BotIdentity,
        options: DispatcherOptions,
    ) -> Self {
        let mut passive = HashMap::new();
        for entry in ctx.registry.enabled() {
            for trigger in &entry.descriptor().passive_triggers {
                match compile_passive(&trigger.name) {
                    Ok(re) => {
                        passive.insert(trigger.name.clone(), re);
                    },
                    Err(e) => {
                        error!(plugin = entry.name(), error = %e, "skipping passive trigger");
                    },
                }
            }
        }
        Self {
            registry: Arc::clone(&ctx.registry),
            authorizer: None,
            gateway,
            identity,
            options,
            passive,
            ctx,
        }
    }

    /// Gate active triggers through `authorizer`. Without one every command
    /// is allowed.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Option<Arc<Authorizer>>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        let message = message.into_effective();
        let mention = self.identity.mention_token();
        let input = MatchInput {
            text: &message.text,
            prefix: &self.options.prefix,
            mention: &mention,
            direct: self.gateway.is_direct(&message.channel_id),
        };
        let mentioned = input.mentioned();

        if let Some((entry, trigger)) = self.find_active(&input, mentioned) {
            return self.run_active(entry, trigger, &message).await;
        }

        let (invocations, handled) = self.run_passive(&message, mentioned).await;
        if !handled && mentioned {
            let reply = self
                .options
                .fallback_replies
                .choose(&mut rand::rng())
                .cloned();
            if let Some(reply) = reply {
                if let Err(e) = self.ctx.outbound.reply(&message.channel_id, reply).await {
                    warn!(channel_id = %message.channel_id, error = %e, "fallback reply dropped");
                }
                return DispatchOutcome::Fallback;
            }
        }
        DispatchOutcome::Passive {
            invocations,
            handled,
        }
    }

    fn find_active<'r>(
        &'r self,
        input: &MatchInput<'_>,
        mentioned: bool,
    ) -> Option<(&'r RegisteredPlugin, &'r str)> {
        self.registry
            .enabled()
            .filter(|entry| eligible(mentioned, entry.descriptor().requires_mention))
            .find_map(|entry| {
                entry
                    .descriptor()
                    .active_triggers
                    .iter()
                    .find(|t| input.matches_active(&t.name))
                    .map(|t| (entry, t.name.as_str()))
            })
    }

    async fn run_active(
        &self,
        entry: &RegisteredPlugin,
        trigger: &str,
        message: &InboundMessage,
    ) -> DispatchOutcome {
        let plugin = entry.name().to_string();
        if let Some(authz) = &self.authorizer {
            let member_of = match self.gateway.memberships(&message.user_id).await {
                Ok(channels) => channels,
                Err(e) => {
                    warn!(user_id = %message.user_id, error = %e, "membership lookup failed");
                    Vec::new()
                },
            };
            let granted = authz
                .is_granted(trigger, &message.user_id, &message.channel_id, &member_of)
                .await;
            if !granted {
                let refusal = format!(
                    "I'm sorry, <@{}> I'm afraid I can't do that.",
                    message.user_id
                );
                if let Err(e) = self.ctx.outbound.reply(&message.channel_id, refusal).await {
                    warn!(channel_id = %message.channel_id, error = %e, "refusal dropped");
                }
                return DispatchOutcome::Denied {
                    plugin,
                    trigger: trigger.to_string(),
                };
            }
        }

        let rewritten = InboundMessage {
            text: strip_prefix(&message.text, &self.options.prefix, trigger),
            ..message.clone()
        };
        debug!(plugin = %plugin, trigger, "dispatching to active plugin");
        self.invoke(entry, trigger, &rewritten).await;
        DispatchOutcome::Command {
            plugin,
            trigger: trigger.to_string(),
        }
    }

    async fn run_passive(&self, message: &InboundMessage, mentioned: bool) -> (usize, bool) {
        let mut invocations = 0;
        let mut handled = false;
        for entry in self.registry.enabled() {
            if !eligible(mentioned, entry.descriptor().requires_mention) {
                continue;
            }
            for trigger in &entry.descriptor().passive_triggers {
                let Some(re) = self.passive.get(&trigger.name) else {
                    continue;
                };
                for matched in passive_matches(re, &message.text) {
                    debug!(
                        plugin = entry.name(),
                        trigger = %trigger.name,
                        "dispatching to passive plugin"
                    );
                    invocations += 1;
                    handled |= self.invoke(entry, matched, message).await;
                }
            }
        }
        (invocations, handled)
    }

    /// Run one handler. Errors and panics are logged and count as "not
    /// handled"; they never reach the caller.
    async fn invoke(
        &self,
        entry: &RegisteredPlugin,
        trigger: &str,
        message: &InboundMessage,
    ) -> bool {
        let call = entry.plugin().process_message(trigger, message, &self.ctx);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(handled)) => handled,
            Ok(Err(e)) => {
                warn!(plugin = entry.name(), trigger, error = %e, "plugin failed");
                false
            },
            Err(_) => {
                error!(plugin = entry.name(), trigger, "plugin panicked");
                false
            },
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("plugins", &self.registry.len())
            .field("rbac", &self.authorizer.is_some())
            .field("identity", &self.identity)
            .field("prefix", &self.options.prefix)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {
        super::*,
        async_trait::async_trait,
        hal_auth::{BindingKind, InMemoryRbacStore},
        hal_channels::{EventReceiver, OutboundReceiver, outbound_queue},
        hal_common::types::{Content, Destination, MessageEdit, MessageStamp, MessageSubtype},
        hal_plugins::{Plugin, PluginDescriptor, ServiceRegistry, Trigger},
    };

    /// Records every invocation as `(trigger, text)`.
    struct Recorder {
        descriptor: PluginDescriptor,
        calls: Mutex<Vec<(String, String)>>,
        handled: bool,
        panics: bool,
    }

    impl Recorder {
        fn new(descriptor: PluginDescriptor) -> Arc<Self> {
            Self::build(descriptor, false)
        }

        fn panicking(descriptor: PluginDescriptor) -> Arc<Self> {
            Self::build(descriptor, true)
        }

        fn build(descriptor: PluginDescriptor, panics: bool) -> Arc<Self> {
            Arc::new(Self {
                descriptor,
                calls: Mutex::new(Vec::new()),
                handled: true,
                panics,
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn metadata(&self) -> PluginDescriptor {
            self.descriptor.clone()
        }

        async fn process_message(
            &self,
            trigger: &str,
            message: &InboundMessage,
            _ctx: &PluginContext,
        ) -> anyhow::Result<bool> {
            self.calls
                .lock()
                .unwrap()
                .push((trigger.to_string(), message.text.clone()));
            if self.panics {
                panic!("boom");
            }
            Ok(self.handled)
        }
    }

    struct StubGateway {
        memberships: Vec<String>,
    }

    #[async_trait]
    impl ChatGateway for StubGateway {
        async fn connect(&self) -> hal_channels::Result<EventReceiver> {
            Err(hal_channels::Error::unavailable("stub"))
        }

        async fn resolve(&self, _destination: &Destination) -> Option<String> {
            None
        }

        async fn send(
            &self,
            _channel_id: &str,
            _content: &Content,
        ) -> hal_channels::Result<MessageStamp> {
            Err(hal_channels::Error::unavailable("stub"))
        }

        async fn edit(
            &self,
            _channel_id: &str,
            _stamp: &MessageStamp,
            _content: &Content,
        ) -> hal_channels::Result<()> {
            Ok(())
        }

        async fn memberships(&self, _user_id: &str) -> hal_channels::Result<Vec<String>> {
            Ok(self.memberships.clone())
        }
    }

    fn active(name: &str, trigger: &str) -> PluginDescriptor {
        PluginDescriptor::new(name, "test").with_active(Trigger::new(trigger, "test"))
    }

    fn passive(name: &str, pattern: &str) -> PluginDescriptor {
        PluginDescriptor::new(name, "test").with_passive(Trigger::new(pattern, "test"))
    }

    fn dispatcher(
        plugins: Vec<Arc<Recorder>>,
        memberships: &[&str],
    ) -> (Dispatcher, OutboundReceiver) {
        let mut registry = PluginRegistry::new();
        for p in plugins {
            registry.register(p).unwrap();
        }
        let (outbound, rx) = outbound_queue(16);
        let ctx = PluginContext {
            outbound,
            registry: Arc::new(registry),
            services: Arc::new(ServiceRegistry::new()),
        };
        let gateway = Arc::new(StubGateway {
            memberships: memberships.iter().map(|s| s.to_string()).collect(),
        });
        let options = DispatcherOptions {
            prefix: "!".into(),
            fallback_replies: vec!["I'm afraid I don't understand.".into()],
        };
        let d = Dispatcher::new(ctx, gateway, BotIdentity::new("UHAL", "hal"), options);
        (d, rx)
    }

    #[tokio::test]
    async fn prefixed_command_runs_once_with_prefix_stripped() {
        let echo = Recorder::new(active("echo", "echo"));
        let (d, mut rx) = dispatcher(vec![echo.clone()], &[]);

        let outcome = d.dispatch(InboundMessage::new("C1", "U1", "!echo hello")).await;
        assert_eq!(outcome, DispatchOutcome::Command {
            plugin: "echo".into(),
            trigger: "echo".into()
        });
        assert_eq!(echo.calls(), [("echo".to_string(), "echo hello".to_string())]);
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn first_registered_plugin_wins() {
        let first = Recorder::new(active("first", "deploy"));
        let second = Recorder::new(active("second", "deploy"));
        let (d, _rx) = dispatcher(vec![first.clone(), second.clone()], &[]);

        d.dispatch(InboundMessage::new("C1", "U1", "!deploy")).await;
        assert_eq!(first.calls().len(), 1);
        assert!(second.calls().is_empty());
    }

    #[tokio::test]
    async fn active_match_skips_passive_pass() {
        let echo = Recorder::new(active("echo", "echo"));
        let watcher = Recorder::new(passive("watcher", "(?s:.*)"));
        let (d, _rx) = dispatcher(vec![echo.clone(), watcher.clone()], &[]);

        d.dispatch(InboundMessage::new("C1", "U1", "!echo hi")).await;
        assert_eq!(echo.calls().len(), 1);
        assert!(watcher.calls().is_empty());
    }

    #[tokio::test]
    async fn direct_message_matches_without_prefix() {
        let help = Recorder::new(active("help", "help"));
        let (d, _rx) = dispatcher(vec![help.clone()], &[]);

        let outcome = d.dispatch(InboundMessage::new("D1", "U1", "help")).await;
        assert!(matches!(outcome, DispatchOutcome::Command { .. }));
        assert_eq!(help.calls(), [("help".to_string(), "help".to_string())]);
    }

    #[tokio::test]
    async fn mention_required_plugin_needs_mention() {
        let quiet = Recorder::new(active("quiet", "status").requiring_mention());
        let (d, _rx) = dispatcher(vec![quiet.clone()], &[]);

        d.dispatch(InboundMessage::new("C1", "U1", "!status")).await;
        assert!(quiet.calls().is_empty());

        d.dispatch(InboundMessage::new("C1", "U1", "<@UHAL> status please")).await;
        assert_eq!(quiet.calls().len(), 1);
    }

    #[tokio::test]
    async fn passive_trigger_fires_once_per_match() {
        let tickets = Recorder::new(passive("tickets", r"#([A-Za-z]{2,8}-?\d{1,10})"));
        let (d, _rx) = dispatcher(vec![tickets.clone()], &[]);

        let outcome = d
            .dispatch(InboundMessage::new("C1", "U1", "see #ABC-123 and #DEF-4"))
            .await;
        assert_eq!(outcome, DispatchOutcome::Passive {
            invocations: 2,
            handled: true
        });
        let matched: Vec<_> = tickets.calls().into_iter().map(|(t, _)| t).collect();
        assert_eq!(matched, ["#ABC-123", "#DEF-4"]);
    }

    #[tokio::test]
    async fn invalid_pattern_skips_only_that_trigger() {
        let mixed = Recorder::new(
            PluginDescriptor::new("mixed", "test")
                .with_passive(Trigger::new("(unclosed", "broken"))
                .with_passive(Trigger::new("ok", "fine")),
        );
        let (d, _rx) = dispatcher(vec![mixed.clone()], &[]);

        d.dispatch(InboundMessage::new("C1", "U1", "ok then")).await;
        assert_eq!(mixed.calls(), [("ok".to_string(), "ok then".to_string())]);
    }

    #[tokio::test]
    async fn panicking_plugin_does_not_stop_others() {
        let bomb = Recorder::panicking(passive("bomb", "x"));
        let after = Recorder::new(passive("after", "x"));
        let (d, _rx) = dispatcher(vec![bomb.clone(), after.clone()], &[]);

        let outcome = d.dispatch(InboundMessage::new("C1", "U1", "x")).await;
        assert_eq!(bomb.calls().len(), 1);
        assert_eq!(after.calls().len(), 1);
        assert_eq!(outcome, DispatchOutcome::Passive {
            invocations: 2,
            handled: true
        });
    }

    #[tokio::test]
    async fn fallback_when_addressed_and_unhandled() {
        let (d, mut rx) = dispatcher(Vec::new(), &[]);

        let outcome = d.dispatch(InboundMessage::new("C1", "U1", "<@UHAL> sing")).await;
        assert_eq!(outcome, DispatchOutcome::Fallback);
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.destination.unwrap().to_string(), "C1");
        assert_eq!(reply.content.unwrap().text, "I'm afraid I don't understand.");

        let outcome = d.dispatch(InboundMessage::new("C1", "U1", "just chatting")).await;
        assert_eq!(outcome, DispatchOutcome::Passive {
            invocations: 0,
            handled: false
        });
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn handled_passive_suppresses_fallback() {
        let watcher = Recorder::new(passive("watcher", "sing"));
        let (d, mut rx) = dispatcher(vec![watcher], &[]);

        d.dispatch(InboundMessage::new("D1", "U1", "sing")).await;
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn edits_are_dispatched_with_new_text() {
        let echo = Recorder::new(active("echo", "echo"));
        let (d, _rx) = dispatcher(vec![echo.clone()], &[]);

        let mut msg = InboundMessage::new("C1", "U1", "typo");
        msg.subtype = MessageSubtype::Edited(MessageEdit {
            user_id: "U2".into(),
            text: "!echo fixed".into(),
        });
        d.dispatch(msg).await;
        assert_eq!(echo.calls(), [("echo".to_string(), "echo fixed".to_string())]);
    }

    async fn rbac_dispatcher(
        plugin: Arc<Recorder>,
        memberships: &[&str],
    ) -> (Dispatcher, OutboundReceiver, Arc<Authorizer>) {
        let authz = Arc::new(
            Authorizer::new(Arc::new(InMemoryRbacStore::new()))
                .await
                .unwrap(),
        );
        authz.add_permission("echo", "Echo").await.unwrap();
        authz.add_role("echoers", "Echoers", &[]).await.unwrap();
        authz.attach_permission("echo", "echoers").await.unwrap();
        authz.add_role("nobody", "Nobody", &[]).await.unwrap();
        authz
            .bind_to_role(BindingKind::User, "U1", &["nobody".to_string()])
            .await
            .unwrap();
        let (d, rx) = dispatcher(vec![plugin], memberships);
        (d.with_authorizer(Some(Arc::clone(&authz))), rx, authz)
    }

    #[tokio::test]
    async fn denial_short_circuits_with_one_refusal() {
        let echo = Recorder::new(active("echo", "echo"));
        let (d, mut rx, _authz) = rbac_dispatcher(echo.clone(), &[]).await;

        let outcome = d.dispatch(InboundMessage::new("C1", "U1", "!echo hi")).await;
        assert_eq!(outcome, DispatchOutcome::Denied {
            plugin: "echo".into(),
            trigger: "echo".into()
        });
        assert!(echo.calls().is_empty());
        let refusal = rx.try_recv().unwrap();
        assert_eq!(
            refusal.content.unwrap().text,
            "I'm sorry, <@U1> I'm afraid I can't do that."
        );
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn membership_binding_grants_command() {
        let echo = Recorder::new(active("echo", "echo"));
        let (d, _rx, authz) = rbac_dispatcher(echo.clone(), &["G1"]).await;
        authz
            .bind_to_role(BindingKind::MemberOf, "G1", &["echoers".to_string()])
            .await
            .unwrap();

        let outcome = d.dispatch(InboundMessage::new("C1", "U1", "!echo hi")).await;
        assert!(matches!(outcome, DispatchOutcome::Command { .. }));
        assert_eq!(echo.calls().len(), 1);
    }
}
