use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::events::{Event, ModelUnavailableStartEvent, OperationalEvent, UnavailableStartEvent};
use crate::{Credential, CredentialId, CredentialState, EventHub, UnavailableReason};

use super::model_unavailable_queue::ModelUnavailableQueue;
use super::selector::{
    Candidate, FillFirstSelector, ModelCooldownError, PickError, PickOptions, RoundRobinSelector,
    SelectionPolicy, SessionAffinitySelector,
};
use super::unavailable_queue::UnavailableQueue;

type ModelStateKey = (CredentialId, String);
type ModelStateValue = (Instant, UnavailableReason);

#[derive(Debug, Clone)]
pub enum AcquireError {
    ProviderUnknown,
    NoActiveCredentials,
}

/// The selection policy to apply within the highest-priority available bucket.
/// `SessionAffinity` needs cache lookups so it is driven through the async
/// `pick_async` path rather than the sync `SelectionPolicy` trait.
pub enum CredentialSelector {
    FillFirst,
    RoundRobin(Arc<RoundRobinSelector>),
    SessionAffinity(Arc<SessionAffinitySelector<FillFirstSelector>>),
}

impl CredentialSelector {
    async fn pick(
        &self,
        provider: &str,
        model: &str,
        options: &PickOptions,
        candidates: &[Candidate],
    ) -> Option<CredentialId> {
        match self {
            CredentialSelector::FillFirst => FillFirstSelector.pick(provider, model, options, candidates),
            CredentialSelector::RoundRobin(selector) => selector.pick(provider, model, options, candidates),
            CredentialSelector::SessionAffinity(selector) => {
                selector.pick_async(provider, model, options, candidates).await
            }
        }
    }
}

pub struct CredentialPool {
    creds: RwLock<HashMap<CredentialId, Credential>>,
    by_provider: RwLock<HashMap<String, Vec<CredentialId>>>,
    states: Arc<RwLock<HashMap<CredentialId, CredentialState>>>,
    model_states: Arc<RwLock<HashMap<ModelStateKey, ModelStateValue>>>,
    priorities: RwLock<HashMap<CredentialId, i32>>,
    events: EventHub,
    queue: Arc<UnavailableQueue>,
    model_queue: Arc<ModelUnavailableQueue>,
}

impl CredentialPool {
    pub fn new(events: EventHub) -> Self {
        let states = Arc::new(RwLock::new(HashMap::new()));
        let model_states = Arc::new(RwLock::new(HashMap::new()));
        let queue = Arc::new(UnavailableQueue::new());
        let model_queue = Arc::new(ModelUnavailableQueue::new());
        queue
            .clone()
            .spawn_recover_task(states.clone(), events.clone());
        model_queue
            .clone()
            .spawn_recover_task(model_states.clone(), events.clone());
        Self {
            creds: RwLock::new(HashMap::new()),
            by_provider: RwLock::new(HashMap::new()),
            states,
            model_states,
            priorities: RwLock::new(HashMap::new()),
            events,
            queue,
            model_queue,
        }
    }

    pub async fn set_priority(&self, id: CredentialId, priority: i32) {
        self.priorities.write().await.insert(id, priority);
    }

    /// Full-fidelity selection: priority-bucketed availability gather plus a
    /// pluggable policy over the winning bucket. `provider = "mixed"` reports
    /// a cooldown error without a provider tag, matching a caller that pooled
    /// candidates across providers before calling in.
    pub async fn pick(
        &self,
        provider: &str,
        model: &str,
        options: &PickOptions,
        selector: &CredentialSelector,
    ) -> Result<(CredentialId, Credential), PickError> {
        let ids = {
            let guard = self.by_provider.read().await;
            guard.get(provider).cloned()
        };
        let Some(ids) = ids else {
            return Err(PickError::AuthNotFound);
        };
        if ids.is_empty() {
            return Err(PickError::AuthNotFound);
        }

        let states = self.states.read().await;
        let model_states = self.model_states.read().await;
        let priorities = self.priorities.read().await;
        let now = Instant::now();

        let mut buckets: HashMap<i32, Vec<CredentialId>> = HashMap::new();
        let mut cooldown_blocked = 0usize;
        let mut other_blocked = 0usize;
        let mut earliest: Option<Instant> = None;

        for id in &ids {
            let (blocked, is_cooldown, next_retry) =
                classify_blocking(&states, &model_states, *id, model, now);
            if blocked {
                if is_cooldown {
                    cooldown_blocked += 1;
                } else {
                    other_blocked += 1;
                }
                if let Some(next_retry) = next_retry {
                    earliest = Some(match earliest {
                        Some(current) => current.min(next_retry),
                        None => next_retry,
                    });
                }
                continue;
            }
            let priority = priorities.get(id).copied().unwrap_or(0);
            buckets.entry(priority).or_default().push(*id);
        }
        drop(priorities);
        drop(model_states);
        drop(states);

        let best_bucket_key = buckets.keys().copied().max();
        let mut candidate_ids = best_bucket_key
            .and_then(|key| buckets.remove(&key))
            .unwrap_or_default();
        candidate_ids.sort();

        if candidate_ids.is_empty() {
            if cooldown_blocked > 0 && other_blocked == 0 {
                let reset_seconds = earliest
                    .map(|instant| instant.saturating_duration_since(now).as_secs())
                    .unwrap_or(0);
                return Err(PickError::ModelCooldown(ModelCooldownError {
                    model: model.to_string(),
                    provider: if provider == "mixed" {
                        None
                    } else {
                        Some(provider.to_string())
                    },
                    reset_seconds,
                }));
            }
            return Err(PickError::AuthUnavailable);
        }

        let priority = best_bucket_key.unwrap_or(0);
        let candidates: Vec<Candidate> = candidate_ids
            .into_iter()
            .map(|id| Candidate { id, priority })
            .collect();

        let chosen = selector
            .pick(provider, model, options, &candidates)
            .await
            .ok_or(PickError::AuthUnavailable)?;
        let cred = self
            .creds
            .read()
            .await
            .get(&chosen)
            .cloned()
            .ok_or(PickError::AuthUnavailable)?;
        Ok((chosen, cred))
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub async fn insert(&self, provider: impl Into<String>, id: CredentialId, cred: Credential) {
        let provider = provider.into();
        self.creds.write().await.insert(id, cred);
        // Avoid duplicated IDs in the provider index; insert() can be called on enable toggles.
        let mut by_provider = self.by_provider.write().await;
        let ids = by_provider.entry(provider).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.states
            .write()
            .await
            .entry(id)
            .or_insert(CredentialState::Active);
    }

    pub async fn update_credential(&self, id: CredentialId, cred: Credential) {
        self.creds.write().await.insert(id, cred);
    }

    pub async fn set_enabled(&self, provider: &str, id: CredentialId, enabled: bool) {
        if enabled {
            let mut by_provider = self.by_provider.write().await;
            let ids = by_provider.entry(provider.to_string()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
            drop(by_provider);

            // If the credential was never inserted before, keep state as Active.
            self.states
                .write()
                .await
                .entry(id)
                .or_insert(CredentialState::Active);
        } else {
            let mut by_provider = self.by_provider.write().await;
            if let Some(ids) = by_provider.get_mut(provider) {
                ids.retain(|x| *x != id);
            }
            let mut model_states = self.model_states.write().await;
            model_states.retain(|(cred_id, _), _| *cred_id != id);
        }
    }

    pub async fn acquire(
        &self,
        provider: &str,
    ) -> Result<(CredentialId, Credential), AcquireError> {
        let ids = {
            let guard = self.by_provider.read().await;
            guard.get(provider).cloned()
        };
        let Some(ids) = ids else {
            return Err(AcquireError::ProviderUnknown);
        };

        let states = self.states.read().await;
        let chosen = ids
            .into_iter()
            .find(|id| matches!(states.get(id), Some(CredentialState::Active)));
        drop(states);

        let Some(id) = chosen else {
            return Err(AcquireError::NoActiveCredentials);
        };
        let cred = self
            .creds
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AcquireError::NoActiveCredentials)?;
        Ok((id, cred))
    }

    pub async fn acquire_for_model(
        &self,
        provider: &str,
        model: &str,
    ) -> Result<(CredentialId, Credential), AcquireError> {
        let ids = {
            let guard = self.by_provider.read().await;
            guard.get(provider).cloned()
        };
        let Some(ids) = ids else {
            return Err(AcquireError::ProviderUnknown);
        };

        let states = self.states.read().await;
        let model_states = self.model_states.read().await;
        let chosen = ids.into_iter().find(|id| {
            if !matches!(states.get(id), Some(CredentialState::Active)) {
                return false;
            }
            let key = (*id, model.to_string());
            match model_states.get(&key) {
                Some((until, _reason)) => *until <= Instant::now(),
                None => true,
            }
        });
        drop(model_states);
        drop(states);

        let Some(id) = chosen else {
            return Err(AcquireError::NoActiveCredentials);
        };
        let cred = self
            .creds
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AcquireError::NoActiveCredentials)?;
        Ok((id, cred))
    }

    pub async fn mark_unavailable(
        &self,
        credential_id: CredentialId,
        duration: Duration,
        reason: UnavailableReason,
    ) {
        let until_instant = Instant::now() + duration;
        {
            let mut guard = self.states.write().await;
            guard.insert(
                credential_id,
                CredentialState::Unavailable {
                    until: until_instant,
                    reason,
                },
            );
        }
        self.queue.push(until_instant, credential_id).await;

        let until_wall = SystemTime::now()
            .checked_add(duration)
            .unwrap_or_else(SystemTime::now);
        self.events
            .emit(Event::Operational(OperationalEvent::UnavailableStart(
                UnavailableStartEvent {
                    at: SystemTime::now(),
                    credential_id,
                    reason,
                    until: until_wall,
                },
            )))
            .await;
    }

    pub async fn mark_model_unavailable(
        &self,
        credential_id: CredentialId,
        model: impl Into<String>,
        duration: Duration,
        reason: UnavailableReason,
    ) {
        let model = model.into();
        let until_instant = Instant::now() + duration;
        {
            let mut guard = self.model_states.write().await;
            guard.insert((credential_id, model.clone()), (until_instant, reason));
        }
        self.model_queue
            .push(until_instant, credential_id, model.clone())
            .await;

        let until_wall = SystemTime::now()
            .checked_add(duration)
            .unwrap_or_else(SystemTime::now);
        self.events
            .emit(Event::Operational(OperationalEvent::ModelUnavailableStart(
                ModelUnavailableStartEvent {
                    at: SystemTime::now(),
                    credential_id,
                    model,
                    reason,
                    until: until_wall,
                },
            )))
            .await;
    }

    pub async fn state(&self, credential_id: CredentialId) -> Option<CredentialState> {
        self.states.read().await.get(&credential_id).cloned()
    }

    pub async fn model_states(
        &self,
        credential_id: CredentialId,
    ) -> Vec<(String, Instant, UnavailableReason)> {
        let now = Instant::now();
        let guard = self.model_states.read().await;
        let mut rows = Vec::new();
        for ((id, model), (until, reason)) in guard.iter() {
            if *id != credential_id {
                continue;
            }
            if *until <= now {
                continue;
            }
            rows.push((model.clone(), *until, *reason));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

/// `isAuthBlockedForModel`: a per-model entry, if present, fully determines
/// blocking for that model; otherwise the auth-level state applies.
/// `RateLimit` is treated as the "cooldown" reason; every other reason is
/// "other" for the purposes of `ModelCooldownError` vs `auth_unavailable`.
fn classify_blocking(
    states: &HashMap<CredentialId, CredentialState>,
    model_states: &HashMap<ModelStateKey, ModelStateValue>,
    id: CredentialId,
    model: &str,
    now: Instant,
) -> (bool, bool, Option<Instant>) {
    if !model.is_empty()
        && let Some((until, reason)) = model_states.get(&(id, model.to_string()))
    {
        if *until > now {
            return (true, matches!(reason, UnavailableReason::RateLimit), Some(*until));
        }
        return (false, false, None);
    }
    match states.get(&id) {
        Some(CredentialState::Unavailable { until, reason }) if *until > now => {
            (true, matches!(reason, UnavailableReason::RateLimit), Some(*until))
        }
        _ => (false, false, None),
    }
}
