//! Merging runtime profiler samples into the system-wide (perf) profile.

use rand_core::RngCore;

use crate::{
    ContainerNames, EnrichmentOptions, MergeResult, Metadata, Metrics, ProcessToProfile,
    ProfilingErrorStack, concatenate_profiles, scale_sample_counts,
};

/// Replaces each process's perf samples with its runtime profiler samples,
/// scaled to the perf sample volume, then concatenates everything.
///
/// Runtime samples for a process perf never saw are dropped. An error stack
/// from a runtime profiler is kept with the perf stacks hung beneath it.
///
/// # Panics
///
/// If a non-empty runtime profile has a sample total of zero.
pub fn merge_profiles<R: RngCore + ?Sized>(
    mut perf_pid_to_profiles: ProcessToProfile,
    process_profiles: ProcessToProfile,
    rng: &mut R,
    container_names: Option<&mut (dyn ContainerNames + '_)>,
    enrichment_options: &EnrichmentOptions,
    metadata: &Metadata,
    metrics: &Metrics,
) -> MergeResult<String> {
    for (pid, mut profile) in process_profiles {
        if profile.stacks.is_empty() {
            continue;
        }

        let process_perf = perf_pid_to_profiles.get(&pid);
        let perf_samples_count = process_perf.map_or(0, |perf| perf.stacks.total());
        let profile_samples_count = profile.stacks.total();
        assert!(
            profile_samples_count > 0,
            "runtime profile for pid {pid} has stacks but no samples"
        );

        profile.stacks = match process_perf {
            Some(perf) if perf_samples_count > 0 && ProfilingErrorStack::is_error_stack(&profile.stacks) => {
                tracing::debug!(pid, "attaching runtime profiler error to {perf_samples_count} perf samples");
                ProfilingErrorStack::attach_error_to_stacks(&perf.stacks, &profile.stacks)
            }
            _ => {
                let ratio = perf_samples_count as f64 / profile_samples_count as f64;
                if process_perf.is_none() {
                    tracing::debug!(pid, "no perf samples, dropping {profile_samples_count} runtime samples");
                } else {
                    tracing::debug!(pid, ratio, "scaling runtime samples");
                }
                scale_sample_counts(profile.stacks, ratio, rng)
            }
        };

        perf_pid_to_profiles.insert(pid, profile);
    }

    concatenate_profiles(&perf_pid_to_profiles, container_names, enrichment_options, metadata, metrics)
}
