// Recording LXD fake for tests
//
// Every call is appended to a log in the order it was made. Replies can be
// overridden per method; unset methods answer with a successful async
// operation (or `true` / an empty list).

use crate::lxd::api::{ApiError, LxdApi, LxdResponse};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// Operation handle used by every canned async response
pub const FAKE_OPERATION: &str = "/1.0/operation/1234";

/// A recorded remote call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ContainerList,
    ContainerDefined(String),
    ContainerRunning(String),
    ContainerState(String),
    ContainerInit(Value),
    ContainerUpdate(String, Value),
    ContainerStart(String, i32),
    ContainerStop(String, i32),
    ContainerReboot(String, i32),
    ContainerFreeze(String, i32),
    ContainerUnfreeze(String, i32),
    ContainerDestroy(String),
    WaitContainerOperation(String, u16, i32),
    OperationInfo(String),
    AliasDefined(String),
    AliasCreate(Value),
    ProfileList,
    ProfileDefined(String),
    ProfileCreate(Value),
    ProfileDelete(String),
}

/// Canned reply for one method
#[derive(Debug, Clone)]
pub enum Reply {
    Bool(bool),
    Names(Vec<String>),
    Response(LxdResponse),
}

#[derive(Default)]
pub struct FakeLxd {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<HashMap<&'static str, Result<Reply, ApiError>>>,
}

impl FakeLxd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `method` answer with `reply`
    pub fn returns(&self, method: &'static str, reply: Reply) -> &Self {
        self.replies.lock().unwrap().insert(method, Ok(reply));
        self
    }

    /// Make `method` fail with `error`
    pub fn fails(&self, method: &'static str, error: ApiError) -> &Self {
        self.replies.lock().unwrap().insert(method, Err(error));
        self
    }

    /// Calls recorded so far, oldest first
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn reply(&self, method: &'static str) -> Option<Result<Reply, ApiError>> {
        self.replies.lock().unwrap().get(method).cloned()
    }

    fn bool_reply(&self, method: &'static str) -> Result<bool, ApiError> {
        match self.reply(method) {
            None => Ok(true),
            Some(Ok(Reply::Bool(value))) => Ok(value),
            Some(Ok(other)) => panic!("{} cannot answer with {:?}", method, other),
            Some(Err(e)) => Err(e),
        }
    }

    fn names_reply(&self, method: &'static str) -> Result<Vec<String>, ApiError> {
        match self.reply(method) {
            None => Ok(Vec::new()),
            Some(Ok(Reply::Names(names))) => Ok(names),
            Some(Ok(other)) => panic!("{} cannot answer with {:?}", method, other),
            Some(Err(e)) => Err(e),
        }
    }

    fn response_reply(&self, method: &'static str) -> Result<LxdResponse, ApiError> {
        match self.reply(method) {
            None => Ok(operation_info_ok()),
            Some(Ok(Reply::Response(response))) => Ok(response),
            Some(Ok(other)) => panic!("{} cannot answer with {:?}", method, other),
            Some(Err(e)) => Err(e),
        }
    }
}

#[async_trait]
impl LxdApi for FakeLxd {
    async fn container_list(&self) -> Result<Vec<String>, ApiError> {
        self.record(Call::ContainerList);
        self.names_reply("container_list")
    }

    async fn container_defined(&self, name: &str) -> Result<bool, ApiError> {
        self.record(Call::ContainerDefined(name.to_string()));
        self.bool_reply("container_defined")
    }

    async fn container_running(&self, name: &str) -> Result<bool, ApiError> {
        self.record(Call::ContainerRunning(name.to_string()));
        self.bool_reply("container_running")
    }

    async fn container_state(&self, name: &str) -> Result<LxdResponse, ApiError> {
        self.record(Call::ContainerState(name.to_string()));
        self.response_reply("container_state")
    }

    async fn container_init(&self, config: &Value) -> Result<LxdResponse, ApiError> {
        self.record(Call::ContainerInit(config.clone()));
        self.response_reply("container_init")
    }

    async fn container_update(
        &self,
        name: &str,
        config: &Value,
    ) -> Result<LxdResponse, ApiError> {
        self.record(Call::ContainerUpdate(name.to_string(), config.clone()));
        self.response_reply("container_update")
    }

    async fn container_start(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError> {
        self.record(Call::ContainerStart(name.to_string(), timeout));
        self.response_reply("container_start")
    }

    async fn container_stop(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError> {
        self.record(Call::ContainerStop(name.to_string(), timeout));
        self.response_reply("container_stop")
    }

    async fn container_reboot(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError> {
        self.record(Call::ContainerReboot(name.to_string(), timeout));
        self.response_reply("container_reboot")
    }

    async fn container_freeze(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError> {
        self.record(Call::ContainerFreeze(name.to_string(), timeout));
        self.response_reply("container_freeze")
    }

    async fn container_unfreeze(
        &self,
        name: &str,
        timeout: i32,
    ) -> Result<LxdResponse, ApiError> {
        self.record(Call::ContainerUnfreeze(name.to_string(), timeout));
        self.response_reply("container_unfreeze")
    }

    async fn container_destroy(&self, name: &str) -> Result<LxdResponse, ApiError> {
        self.record(Call::ContainerDestroy(name.to_string()));
        self.response_reply("container_destroy")
    }

    async fn wait_container_operation(
        &self,
        operation: &str,
        status_code: u16,
        timeout: i32,
    ) -> Result<bool, ApiError> {
        self.record(Call::WaitContainerOperation(
            operation.to_string(),
            status_code,
            timeout,
        ));
        self.bool_reply("wait_container_operation")
    }

    async fn operation_info(&self, operation: &str) -> Result<LxdResponse, ApiError> {
        self.record(Call::OperationInfo(operation.to_string()));
        match self.reply("operation_info") {
            None => Ok(container_state(200)),
            Some(Ok(Reply::Response(response))) => Ok(response),
            Some(Ok(other)) => panic!("operation_info cannot answer with {:?}", other),
            Some(Err(e)) => Err(e),
        }
    }

    async fn alias_defined(&self, alias: &str) -> Result<bool, ApiError> {
        self.record(Call::AliasDefined(alias.to_string()));
        self.bool_reply("alias_defined")
    }

    async fn alias_create(&self, alias: &Value) -> Result<bool, ApiError> {
        self.record(Call::AliasCreate(alias.clone()));
        self.bool_reply("alias_create")
    }

    async fn profile_list(&self) -> Result<Vec<String>, ApiError> {
        self.record(Call::ProfileList);
        self.names_reply("profile_list")
    }

    async fn profile_defined(&self, name: &str) -> Result<bool, ApiError> {
        self.record(Call::ProfileDefined(name.to_string()));
        self.bool_reply("profile_defined")
    }

    async fn profile_create(&self, config: &Value) -> Result<LxdResponse, ApiError> {
        self.record(Call::ProfileCreate(config.clone()));
        self.response_reply("profile_create")
    }

    async fn profile_delete(&self, name: &str) -> Result<LxdResponse, ApiError> {
        self.record(Call::ProfileDelete(name.to_string()));
        self.response_reply("profile_delete")
    }
}

/// Async response announcing [`FAKE_OPERATION`]
pub fn operation_info_ok() -> LxdResponse {
    LxdResponse::new(
        200,
        json!({
            "type": "async",
            "status": "OK",
            "status_code": 100,
            "operation": FAKE_OPERATION,
            "metadata": {
                "id": "1234",
                "class": "task",
                "status": "Running",
                "status_code": 103,
                "may_cancel": false,
                "err": ""
            }
        }),
    )
}

/// Operation info whose `metadata.status_code` is `status_code`
pub fn container_state(status_code: u16) -> LxdResponse {
    LxdResponse::new(
        200,
        json!({
            "type": "sync",
            "status": "Success",
            "status_code": 200,
            "metadata": {
                "id": "1234",
                "status_code": status_code,
                "err": if status_code == 200 { "" } else { "Fake failure" }
            }
        }),
    )
}

/// Plain synchronous success
pub fn standard_return() -> LxdResponse {
    LxdResponse::new(
        200,
        json!({
            "type": "sync",
            "status": "Success",
            "status_code": 200,
            "metadata": {}
        }),
    )
}
