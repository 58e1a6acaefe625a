/// Where a freshly started attacker container can be reached.
#[derive(Debug, Clone)]
pub struct AttackerEndpoint {
    /// Full engine-assigned container id.
    pub runtime_id: String,
    /// First twelve characters of the id; embedded in the terminal URL path.
    pub short_id: String,
    /// Dynamically assigned host port of the in-container terminal service.
    pub host_port: u16,
    /// Player-facing URL: `http://{host}:{port}/{short_id}/`.
    pub terminal_url: String,
}

/// Result of a label-scoped bulk operation. Bulk operations keep going past
/// individual failures so one wedged container cannot block the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkOutcome {
    pub matched: usize,
    pub failed: usize,
}

impl BulkOutcome {
    pub fn succeeded(&self) -> usize {
        self.matched - self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_outcome_counts_partial_success() {
        let outcome = BulkOutcome {
            matched: 5,
            failed: 2,
        };
        assert_eq!(outcome.succeeded(), 3);
        assert_eq!(BulkOutcome::default().succeeded(), 0);
    }
}
