use std::collections::VecDeque;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::burn_plan::{BurnPlanAnalysis, RecentBurnPlan, RecentBurnPlanSummary};

pub const RECENT_PLAN_CAPACITY: usize = 50;

/// In-memory ring of the plans this server produced, newest at the front.
#[derive(Debug)]
pub struct RecentPlans {
    capacity: usize,
    plans: Mutex<VecDeque<RecentBurnPlan>>,
}

impl Default for RecentPlans {
    fn default() -> Self {
        Self::with_capacity(RECENT_PLAN_CAPACITY)
    }
}

impl RecentPlans {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            plans: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub async fn record(&self, plan: &BurnPlanAnalysis) -> RecentBurnPlan {
        let entry = RecentBurnPlan {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            burn_plan: RecentBurnPlanSummary::from(plan),
        };
        let mut plans = self.plans.lock().await;
        plans.push_front(entry.clone());
        plans.truncate(self.capacity);
        entry
    }

    pub async fn latest(&self, limit: usize) -> Vec<RecentBurnPlan> {
        self.plans.lock().await.iter().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.plans.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.lock().await.is_empty()
    }
}
