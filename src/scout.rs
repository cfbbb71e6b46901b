//! Peer acquisition loop.
//!
//! A search runs a bounded number of attempts. Each attempt fetches a fresh
//! candidate list from the directory, assesses every new candidate on a
//! bounded set of concurrent tasks, and accepts the ones the evaluator
//! passes. Attempts never overlap: the stop decision is taken only after an
//! attempt's tasks have all finished, been abandoned or been cancelled.
//!
//! Nothing measured in one attempt is reused in the next. A candidate that
//! failed before is assessed again from scratch if the directory returns it.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{DirectoryError, SearchError};
use crate::evaluator::{evaluate, Verdict};
use crate::network::{GeoResolver, LatencyProber, PeerDirectory};
use crate::types::{PeerAssessment, PeerCandidate, SearchCriteria, SearchResult, SearchStatus};

/// Tuning for how a search uses the network. None of it changes which peers qualify.
#[derive(Debug, Clone)]
pub struct ScoutSettings {
    /// Candidates assessed at once within an attempt
    pub concurrency: usize,
    /// Pause between attempts
    pub attempt_delay: Duration,
    /// Wall-clock limit for one attempt's assessments
    pub attempt_budget: Option<Duration>,
    /// Probe timeout. Defaults to the search's max latency.
    pub probe_timeout: Option<Duration>,
}

impl Default for ScoutSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            attempt_delay: Duration::ZERO,
            attempt_budget: None,
            probe_timeout: None,
        }
    }
}

/// Accepted peers of one search, unique by node id and capped at the desired count.
#[derive(Debug)]
struct Accumulator {
    peers: Vec<PeerCandidate>,
    ids: HashSet<String>,
    capacity: usize,
}

impl Accumulator {
    fn new(capacity: usize) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn is_full(&self) -> bool {
        self.peers.len() >= self.capacity
    }

    fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns false for duplicates and once full
    fn try_accept(&mut self, candidate: PeerCandidate) -> bool {
        if self.is_full() || !self.ids.insert(candidate.id.clone()) {
            return false;
        }
        self.peers.push(candidate);
        true
    }
}

/// What one attempt did, for logging
#[derive(Debug, Default)]
struct AttemptSummary {
    fetched: usize,
    assessed: usize,
    accepted: usize,
    abandoned: usize,
}

pub struct PeerScout {
    directory: Arc<dyn PeerDirectory>,
    geo: Arc<dyn GeoResolver>,
    prober: Arc<dyn LatencyProber>,
    settings: ScoutSettings,
}

impl PeerScout {
    pub fn new(
        directory: Arc<dyn PeerDirectory>,
        geo: Arc<dyn GeoResolver>,
        prober: Arc<dyn LatencyProber>,
        settings: ScoutSettings,
    ) -> Self {
        Self {
            directory,
            geo,
            prober,
            settings,
        }
    }

    /// Find up to `criteria.desired_count()` peers for `network`.
    ///
    /// Fails only when the directory rejects the network outright. Every
    /// other failure is absorbed: a bad candidate is rejected, a failed
    /// directory fetch uses up an attempt.
    pub async fn search(
        &self,
        network: &str,
        criteria: &SearchCriteria,
    ) -> Result<SearchResult, SearchError> {
        info!(
            "🔎 Starting PeerScout for {}. Looking for {} peers over {} attempts",
            network,
            criteria.desired_count(),
            criteria.max_attempts()
        );

        let shared_criteria = Arc::new(criteria.clone());
        let mut accepted = Accumulator::new(criteria.desired_count());
        let mut attempts = 0u32;

        let status = loop {
            let candidates = match self.directory.fetch_candidates(network).await {
                Ok(candidates) => candidates,
                Err(DirectoryError::UnknownNetwork {
                    network,
                    suggestions,
                }) => {
                    return Err(SearchError::InvalidNetwork {
                        network,
                        suggestions,
                    })
                }
                Err(DirectoryError::ServiceUnavailable { network }) => {
                    return Err(SearchError::ServiceUnavailable { network })
                }
                Err(e @ DirectoryError::Transient(_)) => {
                    attempts += 1;
                    warn!("⚠️  Attempt {} could not fetch candidates: {}", attempts, e);
                    if let Some(status) = self.stop_status(&accepted, attempts, criteria) {
                        break status;
                    }
                    self.pause().await;
                    continue;
                }
            };

            attempts += 1;
            let summary = self
                .run_attempt(candidates, &shared_criteria, &mut accepted)
                .await;
            debug!(
                attempt = attempts,
                fetched = summary.fetched,
                assessed = summary.assessed,
                accepted = summary.accepted,
                abandoned = summary.abandoned,
                "Attempt finished"
            );

            if let Some(status) = self.stop_status(&accepted, attempts, criteria) {
                break status;
            }

            if accepted.peers.is_empty() {
                warn!(
                    "After {} attempts, we have not found a suitable peer. Retrying...",
                    attempts
                );
            } else {
                info!(
                    "After {} attempts, we currently have {} peers (need {}). Retrying...",
                    attempts,
                    accepted.len(),
                    criteria.desired_count()
                );
            }
            self.pause().await;
        };

        match status {
            SearchStatus::Succeeded => info!(
                "✓ Found {} peers in {} attempt(s)",
                accepted.len(),
                attempts
            ),
            SearchStatus::Partial => warn!(
                "Attempt budget exhausted: {} of {} peers found",
                accepted.len(),
                criteria.desired_count()
            ),
        }

        Ok(SearchResult {
            peers: accepted.peers,
            attempts,
            status,
        })
    }

    fn stop_status(
        &self,
        accepted: &Accumulator,
        attempts: u32,
        criteria: &SearchCriteria,
    ) -> Option<SearchStatus> {
        if accepted.is_full() {
            Some(SearchStatus::Succeeded)
        } else if attempts >= criteria.max_attempts() {
            Some(SearchStatus::Partial)
        } else {
            None
        }
    }

    async fn pause(&self) {
        if !self.settings.attempt_delay.is_zero() {
            tokio::time::sleep(self.settings.attempt_delay).await;
        }
    }

    /// Assess this attempt's candidates concurrently and accept what passes.
    ///
    /// Acceptance happens here, on the joining side, so the accumulator has a
    /// single writer. Remaining tasks are aborted once the target is met or
    /// the attempt budget runs out.
    async fn run_attempt(
        &self,
        candidates: Vec<PeerCandidate>,
        criteria: &Arc<SearchCriteria>,
        accepted: &mut Accumulator,
    ) -> AttemptSummary {
        let mut summary = AttemptSummary {
            fetched: candidates.len(),
            ..Default::default()
        };

        let mut pending: VecDeque<PeerCandidate> = candidates
            .into_iter()
            .filter(|c| !accepted.contains(&c.id))
            .collect();

        let concurrency = self.settings.concurrency.max(1);
        let probe_timeout = self
            .settings
            .probe_timeout
            .unwrap_or_else(|| criteria.max_latency());
        let deadline = self
            .settings
            .attempt_budget
            .map(|budget| tokio::time::Instant::now() + budget);

        let mut tasks = JoinSet::new();

        loop {
            while tasks.len() < concurrency {
                let Some(candidate) = pending.pop_front() else {
                    break;
                };
                if accepted.contains(&candidate.id) {
                    continue;
                }
                let geo = Arc::clone(&self.geo);
                let prober = Arc::clone(&self.prober);
                let criteria = Arc::clone(criteria);
                tasks.spawn(async move {
                    assess(candidate, geo.as_ref(), prober.as_ref(), &criteria, probe_timeout).await
                });
            }

            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        summary.abandoned = tasks.len() + pending.len();
                        warn!(
                            "⏱️  Attempt time budget reached, {} candidates left unresolved",
                            summary.abandoned
                        );
                        tasks.abort_all();
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = joined else {
                break;
            };

            let assessment = match joined {
                Ok(assessment) => assessment,
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!("Candidate assessment task failed: {}", e);
                    }
                    continue;
                }
            };
            summary.assessed += 1;

            match evaluate(&assessment, criteria) {
                Verdict::Accept => {
                    let peer = assessment.candidate;
                    let label = peer.to_string();
                    if accepted.try_accept(peer) {
                        summary.accepted += 1;
                        debug!(
                            "✅ {} accepted (country={}, latency={:?})",
                            label,
                            assessment.country.as_ref().map_or("-", |c| c.as_str()),
                            assessment.latency
                        );
                    }
                }
                Verdict::Reject(reason) => {
                    debug!("Skipping {}: {}", assessment.candidate, reason);
                }
            }

            if accepted.is_full() {
                summary.abandoned = tasks.len() + pending.len();
                tasks.abort_all();
                break;
            }
        }

        summary
    }
}

/// Measure one candidate. The probe only runs once the country has passed.
async fn assess(
    candidate: PeerCandidate,
    geo: &dyn GeoResolver,
    prober: &dyn LatencyProber,
    criteria: &SearchCriteria,
    probe_timeout: Duration,
) -> PeerAssessment {
    let country = match geo.resolve_country(candidate.ip).await {
        Ok(country) => Some(country),
        Err(e) => {
            warn!("Error retrieving location for {}: {}", candidate, e);
            None
        }
    };

    let assessment = PeerAssessment::new(candidate).with_country(country);
    if let Verdict::Reject(reason) = evaluate(&assessment, criteria) {
        if reason.is_geographic() {
            return assessment;
        }
    }

    let latency = match prober
        .probe(assessment.candidate.socket_addr(), probe_timeout)
        .await
    {
        Ok(latency) => Some(latency),
        Err(e) => {
            debug!("{}", e);
            None
        }
    };

    assessment.with_latency(latency)
}
