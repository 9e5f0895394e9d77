use anyhow::Result;
use aya::maps::PerCpuArray;
use aya::Ebpf;
use reqscope_common::{
    STAT_CAPTURED, STAT_COUNT, STAT_DROPPED, STAT_FIELD_FAULTS, STAT_LAYOUT_MISSING,
};

use super::event_processor::ConsumerStats;
use crate::domain::ProbeError;

const STATS_MAP: &str = "CAPTURE_STATS";

/// Kernel-side counters, summed over all CPUs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Records committed to the ring buffer
    pub captured: u64,
    /// Records lost because the ring buffer was full
    pub dropped: u64,
    /// Fields left empty because target memory was unreadable
    pub field_faults: u64,
    /// Invocations that found no usable layout
    pub layout_missing: u64,
}

impl CaptureStats {
    fn from_counters(counters: &[u64; STAT_COUNT as usize]) -> Self {
        Self {
            captured: counters[STAT_CAPTURED as usize],
            dropped: counters[STAT_DROPPED as usize],
            field_faults: counters[STAT_FIELD_FAULTS as usize],
            layout_missing: counters[STAT_LAYOUT_MISSING as usize],
        }
    }
}

/// Read the `CAPTURE_STATS` per-CPU counters
///
/// # Errors
/// Returns an error if the map is missing or cannot be read
pub fn read_capture_stats(bpf: &Ebpf) -> Result<CaptureStats> {
    let map: PerCpuArray<_, u64> =
        PerCpuArray::try_from(bpf.map(STATS_MAP).ok_or(ProbeError::MapNotFound(STATS_MAP))?)?;

    let mut counters = [0u64; STAT_COUNT as usize];
    for (index, counter) in (0u32..).zip(counters.iter_mut()) {
        let per_cpu = map.get(&index, 0)?;
        *counter = per_cpu.iter().copied().fold(0u64, u64::wrapping_add);
    }
    Ok(CaptureStats::from_counters(&counters))
}

/// Render the end-of-run summary
#[must_use]
pub fn format_capture_summary(
    kernel: Option<&CaptureStats>,
    consumer: &ConsumerStats,
    sink_dropped: u64,
) -> String {
    let mut lines = vec![String::from("reqscope summary:")];
    if let Some(kernel) = kernel {
        lines.push(format!("   - Captured in kernel:   {}", kernel.captured));
        lines.push(format!("   - Dropped (ring full):  {}", kernel.dropped));
        lines.push(format!("   - Unreadable fields:    {}", kernel.field_faults));
        if kernel.layout_missing > 0 {
            lines.push(format!("   - Missing layout:       {}", kernel.layout_missing));
        }
    }
    lines.push(format!("   - Records consumed:     {}", consumer.records));
    lines.push(format!("   - Truncated fields:     {}", consumer.truncated_fields));
    if consumer.short_records > 0 {
        lines.push(format!("   - Short records:        {}", consumer.short_records));
    }
    lines.push(format!("   - Dropped (output):     {sink_dropped}"));
    lines.join("\n")
}

/// Print the end-of-run summary to stderr so stdout stays machine-readable
pub fn print_capture_summary(
    kernel: Option<&CaptureStats>,
    consumer: &ConsumerStats,
    sink_dropped: u64,
) {
    eprintln!("\n{}", format_capture_summary(kernel, consumer, sink_dropped));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_counters_uses_stat_indices() {
        let mut counters = [0u64; STAT_COUNT as usize];
        counters[STAT_CAPTURED as usize] = 10;
        counters[STAT_DROPPED as usize] = 2;
        counters[STAT_FIELD_FAULTS as usize] = 3;
        counters[STAT_LAYOUT_MISSING as usize] = 4;

        let stats = CaptureStats::from_counters(&counters);
        assert_eq!(
            stats,
            CaptureStats { captured: 10, dropped: 2, field_faults: 3, layout_missing: 4 }
        );
    }

    #[test]
    fn test_summary_lists_counters() {
        let kernel = CaptureStats { captured: 5, dropped: 1, ..Default::default() };
        let consumer = ConsumerStats { records: 4, short_records: 0, truncated_fields: 2 };
        let summary = format_capture_summary(Some(&kernel), &consumer, 0);

        assert!(summary.contains("Captured in kernel:   5"));
        assert!(summary.contains("Dropped (ring full):  1"));
        assert!(summary.contains("Truncated fields:     2"));
        assert!(!summary.contains("Missing layout"));
        assert!(!summary.contains("Short records"));
    }

    #[test]
    fn test_summary_without_kernel_counters() {
        let summary = format_capture_summary(None, &ConsumerStats::default(), 3);
        assert!(!summary.contains("Captured in kernel"));
        assert!(summary.contains("Dropped (output):     3"));
    }
}
