// ── Configuration editor drafts ──
//
// Local, never-synced state for composing a new fan configuration. Lives
// in reactive values so views can observe it like backend state.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::TemperatureThreshold;
use crate::store::Reactive;
use crate::stream::{Derived, ValueStream};

/// Fan curve given to a freshly added fan.
pub fn default_thresholds() -> Vec<TemperatureThreshold> {
    vec![
        TemperatureThreshold {
            up_threshold: 0,
            down_threshold: 0,
            fan_speed: 0.0,
        },
        TemperatureThreshold {
            up_threshold: 50,
            down_threshold: 40,
            fan_speed: 100.0,
        },
    ]
}

/// One fan being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanDraft {
    pub index: usize,
    pub display_name: Option<String>,
    pub read_register: u8,
    pub write_register: u8,
    pub min_speed_value: u16,
    pub max_speed_value: u16,
    pub independent_read_min_max_values: bool,
    pub min_speed_value_read: u16,
    pub max_speed_value_read: u16,
    pub reset_required: bool,
    pub fan_speed_reset_value: u16,
    pub temperature_thresholds: Vec<TemperatureThreshold>,
}

impl FanDraft {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            display_name: None,
            read_register: 0,
            write_register: 0,
            min_speed_value: 0,
            max_speed_value: 0,
            independent_read_min_max_values: false,
            min_speed_value_read: 0,
            max_speed_value_read: 0,
            reset_required: false,
            fan_speed_reset_value: 0,
            temperature_thresholds: default_thresholds(),
        }
    }

    /// The display name, or `Fan #n` counting from one.
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("Fan #{}", self.index + 1))
    }
}

/// The list of fans in the configuration being edited.
#[derive(Clone)]
pub struct FanListDraft {
    fans: Reactive<Vec<FanDraft>>,
    selected: Reactive<Option<FanDraft>>,
}

impl Default for FanListDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl FanListDraft {
    /// A draft with a single default fan.
    pub fn new() -> Self {
        Self {
            fans: Reactive::writable("fans_draft", vec![FanDraft::new(0)]),
            selected: Reactive::writable("selected_fan", None),
        }
    }

    pub fn fans(&self) -> Vec<FanDraft> {
        self.fans.get()
    }

    pub fn subscribe(&self) -> ValueStream<Vec<FanDraft>> {
        self.fans.subscribe()
    }

    pub fn len(&self) -> usize {
        self.fans.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fans.get().is_empty()
    }

    /// Number of fans as a derived value.
    pub fn count(&self) -> Derived<usize> {
        self.fans.subscribe().map(Vec::len)
    }

    /// Replace the fan at `fan.index`. Returns `false` if there is none.
    pub fn edit(&self, fan: FanDraft) -> bool {
        if fan.index >= self.len() {
            debug!(index = fan.index, "edit of missing fan ignored");
            return false;
        }
        self.fans.update(|fans| {
            let index = fan.index;
            if let Some(slot) = fans.get_mut(index) {
                *slot = fan;
            }
        });
        true
    }

    /// Grow with default fans or truncate. A length below one is ignored.
    pub fn set_len(&self, len: usize) {
        if len < 1 {
            return;
        }
        self.fans.update(|fans| {
            if len <= fans.len() {
                fans.truncate(len);
            } else {
                let start = fans.len();
                fans.extend((start..len).map(FanDraft::new));
            }
        });
    }

    /// Copy fan `index` into the selection. Out of range leaves the
    /// selection unchanged.
    pub fn select(&self, index: usize) -> bool {
        let Some(fan) = self.fans.get().get(index).cloned() else {
            return false;
        };
        self.selected.set(Some(fan));
        true
    }

    pub fn selected(&self) -> Option<FanDraft> {
        self.selected.get()
    }

    pub fn subscribe_selected(&self) -> ValueStream<Option<FanDraft>> {
        self.selected.subscribe()
    }
}

/// Top-level fields of the configuration being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDraftHeader {
    pub name: String,
    pub model: String,
    pub author: String,
    pub ec_poll_interval_ms: u64,
    pub read_write_words: bool,
    pub critical_temperature: u32,
}

impl Default for ConfigDraftHeader {
    fn default() -> Self {
        Self::for_model("")
    }
}

impl ConfigDraftHeader {
    /// Name and model both seeded from the computer model.
    pub fn for_model(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            name: model.clone(),
            model,
            author: String::new(),
            ec_poll_interval_ms: 1000,
            read_write_words: false,
            critical_temperature: 50,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn starts_with_one_default_fan() {
        let draft = FanListDraft::new();
        let fans = draft.fans();
        assert_eq!(fans.len(), 1);
        assert_eq!(fans[0].label(), "Fan #1");
        assert_eq!(fans[0].temperature_thresholds, default_thresholds());
    }

    #[test]
    fn set_len_grows_and_truncates() {
        let draft = FanListDraft::new();
        draft.set_len(3);
        let labels: Vec<String> = draft.fans().iter().map(FanDraft::label).collect();
        assert_eq!(labels, vec!["Fan #1", "Fan #2", "Fan #3"]);

        draft.set_len(2);
        assert_eq!(draft.len(), 2);

        draft.set_len(0);
        assert_eq!(draft.len(), 2);
    }

    #[test]
    fn edit_replaces_at_index() {
        let draft = FanListDraft::new();
        draft.set_len(2);
        let mut fan = draft.fans()[1].clone();
        fan.display_name = Some("GPU Fan".into());
        fan.write_register = 0x94;
        assert!(draft.edit(fan.clone()));
        assert_eq!(draft.fans()[1], fan);

        assert!(!draft.edit(FanDraft::new(5)));
        assert_eq!(draft.len(), 2);
    }

    #[test]
    fn select_out_of_range_keeps_selection() {
        let draft = FanListDraft::new();
        assert!(draft.select(0));
        assert_eq!(draft.selected().unwrap().index, 0);
        assert!(!draft.select(4));
        assert_eq!(draft.selected().unwrap().index, 0);
    }

    #[tokio::test]
    async fn count_follows_length() {
        let draft = FanListDraft::new();
        let mut count = draft.count();
        assert_eq!(*count.get(), 1);
        draft.set_len(4);
        assert_eq!(count.changed().await.as_deref(), Some(&4));
    }

    #[test]
    fn header_is_seeded_from_model() {
        let header = ConfigDraftHeader::for_model("Acer Nitro AN515-54");
        assert_eq!(header.name, "Acer Nitro AN515-54");
        assert_eq!(header.model, "Acer Nitro AN515-54");
        assert_eq!(header.ec_poll_interval_ms, 1000);
        assert!(!header.read_write_words);
        assert_eq!(header.critical_temperature, 50);
    }
}
