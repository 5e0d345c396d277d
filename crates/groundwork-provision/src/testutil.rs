//! In-memory fakes for the capability traits, shared by the unit tests.

use async_trait::async_trait;
use groundwork_cloud::{
    AccountStatus, AccountSummary, AccountsApi, CloudError, CreationState, KeyHandle,
    ObjectVersionPage, ObjectVersionRef, Result as CloudResult, StorageApi,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::Result;
use crate::tofu::{BackendVars, InfraTool, PlanVerdict};

#[derive(Default)]
pub(crate) struct FakeAccounts {
    accounts: Mutex<Vec<AccountSummary>>,
    created: Mutex<Vec<(String, String)>>,
    creation_states: Mutex<VecDeque<CreationState>>,
    conflict_on_create: AtomicBool,
    in_progress_forever: AtomicBool,
    status_probes: AtomicUsize,
    moves: Mutex<Vec<(String, String)>>,
    closed: Mutex<Vec<String>>,
    failing_closures: Mutex<HashSet<String>>,
    request_counter: AtomicUsize,
}

impl FakeAccounts {
    pub fn insert(&self, account: AccountSummary) {
        self.accounts.lock().unwrap().push(account);
    }

    pub fn created(&self) -> Vec<(String, String)> {
        self.created.lock().unwrap().clone()
    }

    pub fn queue_creation_states(&self, states: impl IntoIterator<Item = CreationState>) {
        self.creation_states.lock().unwrap().extend(states);
    }

    pub fn fail_create_with_conflict(&self) {
        self.conflict_on_create.store(true, Ordering::SeqCst);
    }

    pub fn always_in_progress(&self) {
        self.in_progress_forever.store(true, Ordering::SeqCst);
    }

    pub fn status_probes(&self) -> usize {
        self.status_probes.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn moves(&self) -> Vec<(String, String)> {
        self.moves.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    pub fn fail_close_for(&self, id: &str) {
        self.failing_closures.lock().unwrap().insert(id.to_string());
    }
}

#[async_trait]
impl AccountsApi for FakeAccounts {
    async fn account_status(&self, account_id: &str) -> CloudResult<AccountStatus> {
        self.status_probes.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == account_id)
            .map(|a| a.status)
            .unwrap_or(AccountStatus::Unknown))
    }

    async fn find_account_by_email(&self, email: &str) -> CloudResult<Option<AccountSummary>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_active_by_name_prefix(&self, prefix: &str) -> CloudResult<Option<AccountSummary>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.status == AccountStatus::Active && a.name.starts_with(prefix))
            .cloned())
    }

    async fn list_accounts(&self) -> CloudResult<Vec<AccountSummary>> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn create_account(&self, name: &str, email: &str) -> CloudResult<String> {
        if self.conflict_on_create.load(Ordering::SeqCst) {
            return Err(CloudError::Conflict(
                "account with this email already exists".to_string(),
            ));
        }
        self.created
            .lock()
            .unwrap()
            .push((name.to_string(), email.to_string()));
        let n = self.request_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("car-{}", n))
    }

    async fn creation_status(&self, _request_id: &str) -> CloudResult<CreationState> {
        if self.in_progress_forever.load(Ordering::SeqCst) {
            return Ok(CreationState::InProgress);
        }
        Ok(self
            .creation_states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CreationState::Succeeded {
                account_id: "900000000001".to_string(),
            }))
    }

    async fn move_to_parent(&self, account_id: &str, parent_id: &str) -> CloudResult<()> {
        self.moves
            .lock()
            .unwrap()
            .push((account_id.to_string(), parent_id.to_string()));
        Ok(())
    }

    async fn close_account(&self, account_id: &str) -> CloudResult<()> {
        if self.failing_closures.lock().unwrap().contains(account_id) {
            return Err(CloudError::CommandFailed {
                code: Some(254),
                stderr: "ConstraintViolationException".to_string(),
            });
        }
        self.closed.lock().unwrap().push(account_id.to_string());
        Ok(())
    }
}

struct FakeObject {
    bucket: String,
    key: String,
    version_id: String,
}

pub(crate) struct FakeStorage {
    create_region: String,
    buckets: Mutex<HashMap<String, String>>,
    tables: Mutex<HashSet<String>>,
    keys: Mutex<HashMap<String, KeyHandle>>,
    objects: Mutex<Vec<FakeObject>>,
    markers: Mutex<Vec<FakeObject>>,
    page_size: AtomicUsize,
    failing_versions: Mutex<HashSet<String>>,
    fail_encryption: AtomicBool,
    skip_table_create: AtomicBool,
    calls: Mutex<Vec<String>>,
    key_counter: AtomicUsize,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self {
            create_region: "eu-west-1".to_string(),
            buckets: Mutex::default(),
            tables: Mutex::default(),
            keys: Mutex::default(),
            objects: Mutex::default(),
            markers: Mutex::default(),
            page_size: AtomicUsize::new(1000),
            failing_versions: Mutex::default(),
            fail_encryption: AtomicBool::new(false),
            skip_table_create: AtomicBool::new(false),
            calls: Mutex::default(),
            key_counter: AtomicUsize::new(0),
        }
    }
}

impl FakeStorage {
    pub fn add_bucket(&self, bucket: &str, region: &str) {
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.to_string(), region.to_string());
    }

    pub fn add_table(&self, table: &str) {
        self.tables.lock().unwrap().insert(table.to_string());
    }

    pub fn add_key(&self, alias: &str) {
        let n = self.key_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.keys.lock().unwrap().insert(
            alias.to_string(),
            KeyHandle {
                key_id: format!("key-{}", n),
                arn: format!("arn:aws:kms:eu-west-1:222222222222:key/key-{}", n),
            },
        );
    }

    pub fn add_object_version(&self, bucket: &str, key: &str, version_id: &str) {
        self.objects.lock().unwrap().push(FakeObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            version_id: version_id.to_string(),
        });
    }

    pub fn add_delete_marker(&self, bucket: &str, key: &str, version_id: &str) {
        self.markers.lock().unwrap().push(FakeObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            version_id: version_id.to_string(),
        });
    }

    pub fn set_page_size(&self, size: usize) {
        self.page_size.store(size, Ordering::SeqCst);
    }

    pub fn fail_delete_version(&self, version_id: &str) {
        self.failing_versions
            .lock()
            .unwrap()
            .insert(version_id.to_string());
    }

    pub fn fail_enable_encryption(&self) {
        self.fail_encryption.store(true, Ordering::SeqCst);
    }

    pub fn ignore_create_table(&self) {
        self.skip_table_create.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StorageApi for FakeStorage {
    async fn bucket_region(&self, bucket: &str) -> CloudResult<Option<String>> {
        Ok(self.buckets.lock().unwrap().get(bucket).cloned())
    }

    async fn create_bucket(&self, bucket: &str) -> CloudResult<()> {
        self.log(format!("create-bucket {}", bucket));
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.to_string(), self.create_region.clone());
        Ok(())
    }

    async fn enable_versioning(&self, bucket: &str) -> CloudResult<()> {
        self.log(format!("enable-versioning {}", bucket));
        Ok(())
    }

    async fn block_public_access(&self, bucket: &str) -> CloudResult<()> {
        self.log(format!("block-public-access {}", bucket));
        Ok(())
    }

    async fn enable_encryption(&self, bucket: &str, _key_arn: &str) -> CloudResult<()> {
        if self.fail_encryption.load(Ordering::SeqCst) {
            return Err(CloudError::CommandFailed {
                code: Some(254),
                stderr: "KMS.NotFoundException".to_string(),
            });
        }
        self.log(format!("enable-encryption {}", bucket));
        Ok(())
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        _starting_token: Option<&str>,
    ) -> CloudResult<ObjectVersionPage> {
        let page_size = self.page_size.load(Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        let markers = self.markers.lock().unwrap();

        let mut remaining = 0;
        let mut versions = Vec::new();
        let mut delete_markers = Vec::new();
        for entry in objects.iter().filter(|o| o.bucket == bucket) {
            remaining += 1;
            if versions.len() + delete_markers.len() < page_size {
                versions.push(ObjectVersionRef {
                    key: entry.key.clone(),
                    version_id: entry.version_id.clone(),
                });
            }
        }
        for entry in markers.iter().filter(|o| o.bucket == bucket) {
            remaining += 1;
            if versions.len() + delete_markers.len() < page_size {
                delete_markers.push(ObjectVersionRef {
                    key: entry.key.clone(),
                    version_id: entry.version_id.clone(),
                });
            }
        }

        Ok(ObjectVersionPage {
            versions,
            delete_markers,
            next_token: (remaining > page_size).then(|| "more".to_string()),
        })
    }

    async fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> CloudResult<()> {
        self.log(format!("delete-object {} {} {}", bucket, key, version_id));
        if self.failing_versions.lock().unwrap().contains(version_id) {
            return Err(CloudError::CommandFailed {
                code: Some(254),
                stderr: "InternalError".to_string(),
            });
        }
        let matches = |o: &FakeObject| {
            !(o.bucket == bucket && o.key == key && o.version_id == version_id)
        };
        self.objects.lock().unwrap().retain(matches);
        self.markers.lock().unwrap().retain(matches);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> CloudResult<()> {
        self.log(format!("delete-bucket {}", bucket));
        self.buckets.lock().unwrap().remove(bucket);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> CloudResult<bool> {
        Ok(self.tables.lock().unwrap().contains(table))
    }

    async fn create_table(&self, table: &str) -> CloudResult<()> {
        self.log(format!("create-table {}", table));
        if !self.skip_table_create.load(Ordering::SeqCst) {
            self.tables.lock().unwrap().insert(table.to_string());
        }
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> CloudResult<()> {
        self.log(format!("delete-table {}", table));
        self.tables.lock().unwrap().remove(table);
        Ok(())
    }

    async fn find_key_by_alias(&self, alias: &str) -> CloudResult<Option<KeyHandle>> {
        Ok(self.keys.lock().unwrap().get(alias).cloned())
    }

    async fn create_key(&self, alias: &str, _description: &str) -> CloudResult<KeyHandle> {
        self.log(format!("create-key {}", alias));
        let n = self.key_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = KeyHandle {
            key_id: format!("key-{}", n),
            arn: format!("arn:aws:kms:eu-west-1:222222222222:key/key-{}", n),
        };
        self.keys
            .lock()
            .unwrap()
            .insert(alias.to_string(), handle.clone());
        Ok(handle)
    }

    async fn delete_alias(&self, alias: &str) -> CloudResult<()> {
        self.log(format!("delete-alias {}", alias));
        self.keys.lock().unwrap().remove(alias);
        Ok(())
    }

    async fn schedule_key_deletion(&self, key_id: &str, pending_days: u32) -> CloudResult<()> {
        self.log(format!("schedule-key-deletion {} {}", key_id, pending_days));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeTool {
    calls: Mutex<Vec<String>>,
    plan_changes: AtomicBool,
    failing_imports: AtomicBool,
}

impl FakeTool {
    pub fn set_plan_changes(&self, changes: bool) {
        self.plan_changes.store(changes, Ordering::SeqCst);
    }

    pub fn fail_import(&self) {
        self.failing_imports.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl InfraTool for FakeTool {
    async fn prepare(&self, _vars: &BackendVars) -> Result<()> {
        self.calls.lock().unwrap().push("init".to_string());
        Ok(())
    }

    async fn import(&self, _vars: &BackendVars, address: &str, resource_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("import {} {}", address, resource_id));
        if self.failing_imports.load(Ordering::SeqCst) {
            return Err(crate::error::ProvisionError::ToolFailed {
                operation: "import".to_string(),
                detail: "resource already managed".to_string(),
            });
        }
        Ok(())
    }

    async fn plan(&self, _vars: &BackendVars) -> Result<PlanVerdict> {
        self.calls.lock().unwrap().push("plan".to_string());
        Ok(if self.plan_changes.load(Ordering::SeqCst) {
            PlanVerdict::ChangesPending
        } else {
            PlanVerdict::NoChanges
        })
    }

    async fn apply(&self, _vars: &BackendVars) -> Result<()> {
        self.calls.lock().unwrap().push("apply".to_string());
        Ok(())
    }
}
