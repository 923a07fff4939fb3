// Copyright 2025 The TreeDb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::models::RowTimestamp;

use super::StoreInner;

// Minimum wait before a reclamation fire, so a burst of near-term
// deadlines cannot re-arm the timer in a tight loop.
pub(crate) const EXPIRE_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchedulerPhase {
    Stopped,
    Idle,
    Armed(RowTimestamp),
    Firing,
}

pub(crate) struct SchedulerState {
    phase: SchedulerPhase,
    timer: Option<JoinHandle<()>>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        SchedulerState {
            phase: SchedulerPhase::Stopped,
            timer: None,
        }
    }
}

impl StoreInner {
    pub(crate) async fn start_scheduler(&self) {
        {
            let mut sched = self.sched.lock().await;
            if sched.phase != SchedulerPhase::Stopped {
                return;
            }
            sched.phase = SchedulerPhase::Idle;
        }
        if let Err(err) = self.clean().await {
            log::error!("reclamation failed: {err}");
        }
        self.rearm().await;
    }

    pub(crate) async fn stop_scheduler(&self) {
        let mut sched = self.sched.lock().await;
        sched.phase = SchedulerPhase::Stopped;
        if let Some(timer) = sched.timer.take() {
            timer.abort();
        }
    }

    /// Offers a new expiry deadline. Ignored while stopped; rearms only
    /// when sooner than what is already armed.
    pub(crate) async fn schedule_expiry(&self, deadline: RowTimestamp) {
        self.arm(deadline).await;
    }

    /// Arms the timer to the earliest pending expiry, or leaves the
    /// scheduler idle when nothing expires.
    async fn rearm(&self) {
        match self.rows.find_expiring(None).await {
            Ok(rows) => {
                if let Some(deadline) = rows.iter().filter_map(|row| row.e).min() {
                    self.arm(deadline).await;
                }
            }
            Err(err) => log::error!("expiry scan failed: {err}"),
        }
    }

    async fn arm(&self, deadline: RowTimestamp) {
        let mut sched = self.sched.lock().await;
        match sched.phase {
            SchedulerPhase::Stopped => return,
            SchedulerPhase::Armed(current) if current <= deadline => return,
            _ => {}
        }
        if let Some(timer) = sched.timer.take() {
            timer.abort();
        }
        let now = self.clock.now();
        let wait = Duration::from_millis(deadline.saturating_sub(now)).max(EXPIRE_WAIT);
        sched.phase = SchedulerPhase::Armed(deadline);
        let weak = self.weak.clone();
        sched.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire().await;
            }
        }));
    }

    // Returns a boxed future to break the recursive future type cycle
    // (arm -> spawn -> fire -> rearm -> arm) that otherwise makes the
    // `Send` bound on the spawned task unprovable.
    fn fire(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.fire_inner())
    }

    async fn fire_inner(&self) {
        {
            let mut sched = self.sched.lock().await;
            if sched.phase == SchedulerPhase::Stopped {
                return;
            }
            sched.phase = SchedulerPhase::Firing;
            sched.timer = None;
        }
        if let Err(err) = self.clean().await {
            log::error!("reclamation failed: {err}");
        }
        {
            let mut sched = self.sched.lock().await;
            // stop() may have landed while the pass ran.
            if sched.phase == SchedulerPhase::Stopped {
                return;
            }
            sched.phase = SchedulerPhase::Idle;
        }
        self.rearm().await;
    }
}
