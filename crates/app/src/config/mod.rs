use quota_core::{AggregateOptions, Partition};
use serde::{Deserialize, Serialize};

/// Size-class and long-wait cutoffs for one aggregation call-site. The
/// monitor and the reports historically use different values, so each
/// carries its own pair instead of sharing a global.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AggregateSettings {
    pub small_job_max_gpu_hours: f64,
    pub long_wait_hours: f64,
}

impl AggregateSettings {
    pub fn monitor_default() -> Self {
        Self {
            small_job_max_gpu_hours: 23.0,
            long_wait_hours: 24.0,
        }
    }

    pub fn report_default() -> Self {
        Self {
            small_job_max_gpu_hours: 50.0,
            long_wait_hours: 6.0,
        }
    }

    pub fn options(&self) -> AggregateOptions {
        AggregateOptions {
            small_job_max_gpu_hours: self.small_job_max_gpu_hours,
            long_wait_hours: self.long_wait_hours,
        }
    }
}

/// Which partitions a pipeline covers and where quota enforcement applies.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PartitionConfig {
    pub report_partitions: Vec<Partition>,
    pub quota_partition: Partition,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            report_partitions: Partition::ALL.to_vec(),
            quota_partition: Partition::Core,
        }
    }
}
