// ── FanStore ──
//
// The container every consumer receives. Owns one reactive value per
// backend quantity, the error log, the derived aggregates, and the
// dispatcher. Constructed once at startup and passed around explicitly.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::poll::PollSource;
use super::push::{EventMode, PushSource};
use super::reactive::Reactive;
use crate::aggregate::mean_temperature;
use crate::channel::{Backend, BackendCommand, BackendEvent};
use crate::command::Dispatcher;
use crate::config::SyncConfig;
use crate::editor::ConfigDraftHeader;
use crate::matcher::{ConfigMatch, ConfigMatcher};
use crate::model::{ConfigInfo, FanSpeeds, PollInterval, Temperatures};
use crate::report::{AppError, ErrorLog};
use crate::stream::{Derived, ValueStream};

// ── FanStore ─────────────────────────────────────────────────────

/// Reactive mirror of the fan-control service.
///
/// Cheaply cloneable via `Arc<FanStoreInner>`. Nothing talks to the
/// backend until a value is subscribed; the last subscriber leaving
/// stops that value's listeners and timers.
#[derive(Clone)]
pub struct FanStore {
    inner: Arc<FanStoreInner>,
}

struct FanStoreInner {
    config: SyncConfig,
    errors: ErrorLog,
    dispatcher: Dispatcher,
    matcher: ConfigMatcher,

    // ── Push-subscribed ──
    active_config: Reactive<String>,
    poll_interval: Reactive<PollInterval>,
    fans_names: Reactive<Vec<String>>,
    target_speeds: Reactive<FanSpeeds>,
    auto: Reactive<Option<bool>>,
    model: Reactive<String>,
    configs_list: Reactive<Vec<ConfigInfo>>,

    // ── Polled ──
    temperatures: Reactive<Temperatures>,
    fans_speeds: Reactive<FanSpeeds>,
    critical: Reactive<bool>,

    // ── Local ──
    active_details: Reactive<Option<ConfigInfo>>,
}

impl FanStore {
    pub fn new(backend: Arc<dyn Backend>, config: SyncConfig) -> Self {
        let errors = ErrorLog::new(Arc::clone(&backend));
        let push =
            |command| PushSource::new(Arc::clone(&backend), errors.clone(), command);

        let poll_interval = Reactive::new(
            "poll_interval",
            config.initial_poll_interval,
            push(BackendCommand::GetPollInterval)
                .on_event(BackendEvent::ConfigChange, EventMode::Refetch),
        );
        let poll = |command| {
            PollSource::new(
                Arc::clone(&backend),
                errors.clone(),
                command,
                poll_interval.clone(),
            )
        };

        let active_config = Reactive::new(
            "config",
            String::new(),
            push(BackendCommand::GetConfig).on_event(BackendEvent::ConfigChange, EventMode::Replace),
        );
        let fans_names = Reactive::new(
            "fans_names",
            Vec::new(),
            push(BackendCommand::GetNames).on_event(BackendEvent::ConfigChange, EventMode::Refetch),
        );
        let target_speeds = Reactive::new(
            "target_speeds",
            Vec::new(),
            push(BackendCommand::GetTargetSpeeds)
                .on_event(BackendEvent::TargetSpeedsChange, EventMode::Replace),
        );
        let auto = Reactive::new(
            "auto",
            None,
            push(BackendCommand::GetAuto).on_event(BackendEvent::AutoChange, EventMode::Replace),
        );
        let model = Reactive::new("model", String::new(), push(BackendCommand::GetModel));
        let configs_list = Reactive::new(
            "configs_list",
            Vec::new(),
            push(BackendCommand::GetConfigsList),
        );

        let temperatures = Reactive::new(
            "temperatures",
            Temperatures::new(),
            poll(BackendCommand::GetTemps),
        );
        let fans_speeds = Reactive::new("fans_speeds", Vec::new(), poll(BackendCommand::GetSpeeds));
        let critical = Reactive::new("critical", false, poll(BackendCommand::GetCritical));

        let dispatcher = Dispatcher::new(backend, errors.clone());
        let matcher = ConfigMatcher::new(config.match_threshold);

        Self {
            inner: Arc::new(FanStoreInner {
                config,
                errors,
                dispatcher,
                matcher,
                active_config,
                poll_interval,
                fans_names,
                target_speeds,
                auto,
                model,
                configs_list,
                temperatures,
                fans_speeds,
                critical,
                active_details: Reactive::writable("active_details", None),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.inner.errors
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Name of the active fan configuration.
    pub fn active_config(&self) -> ValueStream<String> {
        self.inner.active_config.subscribe()
    }

    pub fn poll_interval(&self) -> ValueStream<PollInterval> {
        self.inner.poll_interval.subscribe()
    }

    pub fn temperatures(&self) -> ValueStream<Temperatures> {
        self.inner.temperatures.subscribe()
    }

    pub fn fans_speeds(&self) -> ValueStream<FanSpeeds> {
        self.inner.fans_speeds.subscribe()
    }

    pub fn critical(&self) -> ValueStream<bool> {
        self.inner.critical.subscribe()
    }

    pub fn fans_names(&self) -> ValueStream<Vec<String>> {
        self.inner.fans_names.subscribe()
    }

    pub fn target_speeds(&self) -> ValueStream<FanSpeeds> {
        self.inner.target_speeds.subscribe()
    }

    /// `None` until the backend has reported the mode.
    pub fn auto(&self) -> ValueStream<Option<bool>> {
        self.inner.auto.subscribe()
    }

    /// Computer model, fetched once per activation.
    pub fn model(&self) -> ValueStream<String> {
        self.inner.model.subscribe()
    }

    /// Available configurations, fetched once per activation.
    pub fn configs_list(&self) -> ValueStream<Vec<ConfigInfo>> {
        self.inner.configs_list.subscribe()
    }

    /// Details of the configuration picked in the UI. Local only.
    pub fn active_details(&self) -> ValueStream<Option<ConfigInfo>> {
        self.inner.active_details.subscribe()
    }

    pub fn set_active_details(&self, details: Option<ConfigInfo>) {
        self.inner.active_details.set(details);
    }

    // ── Derived values ───────────────────────────────────────────

    /// Mean of all sensors; `None` while no temperature is known.
    pub fn mean_temperature(&self) -> Derived<Option<f64>> {
        self.temperatures().map(mean_temperature)
    }

    /// Configs list ranked against the computer model.
    pub fn filtered_configs(&self) -> Derived<Vec<ConfigMatch>> {
        let matcher = self.inner.matcher;
        Derived::combine(self.configs_list(), self.model(), move |configs, model| {
            matcher.rank(model, configs)
        })
    }

    pub fn last_error(&self) -> Derived<Option<Arc<AppError>>> {
        self.inner.errors.last_error()
    }

    /// Header for a new configuration, seeded from the current model.
    pub fn config_draft(&self) -> ConfigDraftHeader {
        ConfigDraftHeader::for_model(self.inner.model.get())
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Clamped to `[0, 100]`; `None` when the speed is not a number.
    pub fn set_target_speed(&self, index: u8, speed: f64) -> Option<JoinHandle<()>> {
        self.inner.dispatcher.set_target_speed(index, speed)
    }

    /// Sends nothing while the mode is unknown.
    pub fn set_auto(&self, auto: Option<bool>) -> Option<JoinHandle<()>> {
        self.inner.dispatcher.set_auto(auto)
    }

    pub fn set_config(&self, name: impl Into<String>) -> JoinHandle<()> {
        self.inner.dispatcher.set_config(name)
    }
}
