//! In-memory runtime used by orchestration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error_handling::types::RuntimeError;
use crate::runtime::engine::ContainerRuntime;
use crate::runtime::types::{AttackerEndpoint, BulkOutcome};

/// Fake engine that records every call and fabricates endpoints.
#[derive(Default)]
pub struct MockRuntime {
    pub created: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
    pub victims: Mutex<Vec<(String, String)>>,
    pub ip_map: Mutex<HashMap<String, String>>,
    pub fail_create: AtomicBool,
    next_port: AtomicU16,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            next_port: AtomicU16::new(40000),
            ..Default::default()
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.lock().unwrap().len()
    }

    pub fn victim_count(&self) -> usize {
        self.victims.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_attacker(&self, name: &str) -> Result<AttackerEndpoint, RuntimeError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RuntimeError::CreationFailed(name.to_string()));
        }
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let runtime_id = format!("{:064}", port);
        let short_id: String = runtime_id.chars().take(12).collect();
        self.created.lock().unwrap().push(name.to_string());
        Ok(AttackerEndpoint {
            runtime_id,
            short_id: short_id.clone(),
            host_port: port,
            terminal_url: format!("http://localhost:{}/{}/", port, short_id),
        })
    }

    async fn ensure_victim(
        &self,
        service_name: &str,
        level_key: &str,
    ) -> Result<(), RuntimeError> {
        self.victims
            .lock()
            .unwrap()
            .push((service_name.to_string(), level_key.to_string()));
        Ok(())
    }

    async fn remove_container(&self, runtime_id: &str) -> Result<(), RuntimeError> {
        self.removed.lock().unwrap().push(runtime_id.to_string());
        Ok(())
    }

    async fn stop_attackers(&self) -> Result<BulkOutcome, RuntimeError> {
        Ok(BulkOutcome {
            matched: self.created_count(),
            failed: 0,
        })
    }

    async fn start_attackers(&self) -> Result<BulkOutcome, RuntimeError> {
        Ok(BulkOutcome {
            matched: self.created_count(),
            failed: 0,
        })
    }

    async fn remove_attackers(&self) -> Result<BulkOutcome, RuntimeError> {
        let matched = self.created_count();
        Ok(BulkOutcome { matched, failed: 0 })
    }

    async fn attacker_for_ip(&self, ip: &str) -> Result<Option<String>, RuntimeError> {
        Ok(self.ip_map.lock().unwrap().get(ip).cloned())
    }
}
