//! Error-marker stacks reported by runtime profilers that failed.
//!
//! A failed profiler reports a single stack carrying a
//! `[Profiling <what>: <reason>]` frame instead of real samples.

use crate::StackToSampleCount;

pub struct ProfilingErrorStack;

impl ProfilingErrorStack {
    pub fn new(what: &str, reason: &str, comm: &str) -> StackToSampleCount {
        let mut stacks = StackToSampleCount::new();
        stacks.add(format!("{comm};[Profiling {what}: {reason}]"), 1);
        stacks
    }

    pub fn is_error_stack(stacks: &StackToSampleCount) -> bool {
        let mut keys = stacks.stacks();
        match (keys.next(), keys.next()) {
            (Some(stack), None) => is_error_marker(stack),
            _ => false,
        }
    }

    /// Hangs every reference stack under every error-marker stack, keeping
    /// the reference counts.
    pub fn attach_error_to_stacks(
        source_stacks: &StackToSampleCount,
        error_stack: &StackToSampleCount,
    ) -> StackToSampleCount {
        let mut dest = StackToSampleCount::new();
        for (frame, count) in source_stacks.iter() {
            for error_frame in error_stack.stacks() {
                dest.add(format!("{error_frame};{frame}"), count);
            }
        }
        dest
    }
}

/// A `[Profiling <what>: <reason>]` frame somewhere below the root frame.
/// The reason may itself contain `;`.
fn is_error_marker(stack: &str) -> bool {
    stack.match_indices(";[Profiling ").any(|(pos, marker)| {
        let rest = &stack[pos + marker.len()..];
        rest.match_indices(": ").any(|(sep, _)| sep > 0 && rest[sep + 2..].find(']').is_some_and(|end| end > 0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructed_error_stack_is_recognized() {
        let stacks = ProfilingErrorStack::new("error", "process exited", "java");
        assert_eq!(stacks.get("java;[Profiling error: process exited]"), Some(1));
        assert!(ProfilingErrorStack::is_error_stack(&stacks));
    }

    #[test]
    fn regular_and_multi_entry_stacks_are_not_errors() {
        let regular: StackToSampleCount = [("java;main;run", 4)].into_iter().collect();
        assert!(!ProfilingErrorStack::is_error_stack(&regular));

        let mut two = ProfilingErrorStack::new("error", "boom", "java");
        two.add("java;main", 1);
        assert!(!ProfilingErrorStack::is_error_stack(&two));

        let rootless: StackToSampleCount = [("[Profiling error: boom]", 1)].into_iter().collect();
        assert!(!ProfilingErrorStack::is_error_stack(&rootless));
        assert!(!ProfilingErrorStack::is_error_stack(&StackToSampleCount::new()));
    }

    #[test]
    fn marker_reason_may_contain_frame_separator() {
        let stacks: StackToSampleCount = [("java;[Profiling error: a;b]", 1)].into_iter().collect();
        assert!(ProfilingErrorStack::is_error_stack(&stacks));

        let empty_reason: StackToSampleCount = [("java;[Profiling error: ]", 1)].into_iter().collect();
        assert!(!ProfilingErrorStack::is_error_stack(&empty_reason));

        let plain_error: StackToSampleCount = [("ERROR;failed_to_attach", 1)].into_iter().collect();
        assert!(!ProfilingErrorStack::is_error_stack(&plain_error));
    }

    #[test]
    fn attach_prefixes_reference_stacks() {
        let error: StackToSampleCount = [("ERROR;failed_to_attach", 1)].into_iter().collect();
        let reference: StackToSampleCount = [("m;n", 50)].into_iter().collect();
        let attached = ProfilingErrorStack::attach_error_to_stacks(&reference, &error);
        assert_eq!(attached.len(), 1);
        assert_eq!(attached.get("ERROR;failed_to_attach;m;n"), Some(50));
    }

    #[test]
    fn attach_replicates_total_per_error_variant() {
        let error: StackToSampleCount = [("E;one", 1), ("E;two", 3)].into_iter().collect();
        let reference: StackToSampleCount = [("a;b", 5), ("a;c", 7)].into_iter().collect();
        let attached = ProfilingErrorStack::attach_error_to_stacks(&reference, &error);
        assert_eq!(attached.len(), 4);
        assert_eq!(attached.total(), reference.total() * 2);
    }
}
