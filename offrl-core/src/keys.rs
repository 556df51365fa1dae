//! Named keys used to read and write fields of a transition batch.
//!
//! Objectives never hard-code field names. They hold a key registry
//! ([`LossKeys`], [`ValueEstimatorKeys`]) whose entries can be remapped
//! independently, so the same objective works with any batch schema.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator of the parts of a [`NestedKey`] in its string form.
pub const KEY_SEPARATOR: char = '.';

/// Key of the sub-batch describing the post-transition state.
pub const NEXT: &str = "next";

/// A hierarchical key, e.g. `("next", "reward")`.
///
/// The string form joins the parts with [`KEY_SEPARATOR`], so
/// `NestedKey::from("next.reward")` equals `NestedKey::from(("next", "reward"))`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NestedKey(Vec<String>);

impl NestedKey {
    /// Creates a key from its parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(|s| s.into()).collect())
    }

    /// Returns the parts of the key.
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Returns the first part and the rest of the key.
    pub fn split_first(&self) -> Option<(&String, &[String])> {
        self.0.split_first()
    }

    /// Returns this key nested under `prefix`.
    pub fn prefixed(&self, prefix: &str) -> Self {
        let mut parts = Vec::with_capacity(self.0.len() + 1);
        parts.push(prefix.to_string());
        parts.extend(self.0.iter().cloned());
        Self(parts)
    }

    /// Returns this key nested under [`NEXT`].
    pub fn next(&self) -> Self {
        self.prefixed(NEXT)
    }
}

impl From<&str> for NestedKey {
    fn from(s: &str) -> Self {
        Self::new(s.split(KEY_SEPARATOR))
    }
}

impl From<String> for NestedKey {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<(&str, &str)> for NestedKey {
    fn from((a, b): (&str, &str)) -> Self {
        Self::new(vec![a, b])
    }
}

impl From<NestedKey> for String {
    fn from(k: NestedKey) -> Self {
        k.to_string()
    }
}

impl fmt::Display for NestedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(&KEY_SEPARATOR.to_string()))
    }
}

/// Keys read and written by actor-critic objectives.
///
/// Defaults: `state_value`, `action`, `_log_prob`, `td_error`,
/// `state_action_value`, `reward`, `done`, `terminated`.
/// `reward`, `done` and `terminated` are looked up under `next`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LossKeys {
    /// Where the value network writes the state value.
    pub value: NestedKey,

    /// The recorded action.
    pub action: NestedKey,

    /// Where the detached log-probability of the recorded action is written.
    pub log_prob: NestedKey,

    /// Where the priority for prioritized replay is written.
    pub priority: NestedKey,

    /// Where the qvalue network writes the state-action value.
    pub state_action_value: NestedKey,

    /// Reward.
    pub reward: NestedKey,

    /// End of trajectory, by termination or truncation.
    pub done: NestedKey,

    /// End of trajectory by termination.
    pub terminated: NestedKey,
}

impl Default for LossKeys {
    fn default() -> Self {
        Self {
            value: "state_value".into(),
            action: "action".into(),
            log_prob: "_log_prob".into(),
            priority: "td_error".into(),
            state_action_value: "state_action_value".into(),
            reward: "reward".into(),
            done: "done".into(),
            terminated: "terminated".into(),
        }
    }
}

impl LossKeys {
    /// Sets the key of the state value.
    pub fn value(mut self, v: impl Into<NestedKey>) -> Self {
        self.value = v.into();
        self
    }

    /// Sets the key of the action.
    pub fn action(mut self, v: impl Into<NestedKey>) -> Self {
        self.action = v.into();
        self
    }

    /// Sets the key of the log-probability.
    pub fn log_prob(mut self, v: impl Into<NestedKey>) -> Self {
        self.log_prob = v.into();
        self
    }

    /// Sets the key of the priority.
    pub fn priority(mut self, v: impl Into<NestedKey>) -> Self {
        self.priority = v.into();
        self
    }

    /// Sets the key of the state-action value.
    pub fn state_action_value(mut self, v: impl Into<NestedKey>) -> Self {
        self.state_action_value = v.into();
        self
    }

    /// Sets the key of the reward.
    pub fn reward(mut self, v: impl Into<NestedKey>) -> Self {
        self.reward = v.into();
        self
    }

    /// Sets the key of the done flag.
    pub fn done(mut self, v: impl Into<NestedKey>) -> Self {
        self.done = v.into();
        self
    }

    /// Sets the key of the terminated flag.
    pub fn terminated(mut self, v: impl Into<NestedKey>) -> Self {
        self.terminated = v.into();
        self
    }

    /// Keys forwarded to a value estimator.
    pub fn value_estimator_keys(&self) -> ValueEstimatorKeys {
        ValueEstimatorKeys {
            value: self.value.clone(),
            reward: self.reward.clone(),
            done: self.done.clone(),
            terminated: self.terminated.clone(),
            ..Default::default()
        }
    }
}

/// Keys read and written by value estimators.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ValueEstimatorKeys {
    /// Where the value network writes the state value.
    pub value: NestedKey,

    /// Reward, looked up under `next`.
    pub reward: NestedKey,

    /// Done flag, looked up under `next`.
    pub done: NestedKey,

    /// Terminated flag, looked up under `next`.
    pub terminated: NestedKey,

    /// Where the return estimate is written.
    pub value_target: NestedKey,

    /// Where the advantage is written.
    pub advantage: NestedKey,
}

impl Default for ValueEstimatorKeys {
    fn default() -> Self {
        Self {
            value: "state_value".into(),
            reward: "reward".into(),
            done: "done".into(),
            terminated: "terminated".into(),
            value_target: "value_target".into(),
            advantage: "advantage".into(),
        }
    }
}
