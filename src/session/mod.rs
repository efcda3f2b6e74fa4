// LXD Session
//
// Façade between the compute driver and one LXD host. Lifecycle calls are
// issued, then the returned background operation is waited on before the
// call resolves. Every remote failure is translated into a `DriverError`.
//
// Key invariants:
// - Mutating calls never return while their LXD operation is pending
// - No retries: one failed remote call is one failed session call
// - Only `DriverError` crosses this boundary

#[cfg(test)]
mod proptests;

use crate::config::LxdConfig;
use crate::error::{DriverError, DriverResult};
use crate::instance::Instance;
use crate::lxd::{
    ApiError, LxdApi, LxdClient, LxdResponse, StatusCode, OPERATION_SUCCESS, WAIT_FOREVER,
};
use crate::metrics;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Session against a single LXD host
pub struct LxdSession {
    api: Arc<dyn LxdApi>,
    /// Timeout handed to LXD with container state changes
    timeout: i32,
}

impl LxdSession {
    /// Create a session over an existing API implementation
    pub fn new(api: Arc<dyn LxdApi>) -> Self {
        Self {
            api,
            timeout: WAIT_FOREVER,
        }
    }

    /// Connect to the host described by the `[lxd]` configuration section
    pub fn from_config(config: &LxdConfig) -> DriverResult<Self> {
        let client = LxdClient::from_config(config).map_err(DriverError::Connect)?;
        info!("LXD session using endpoint {}", client.endpoint());
        Ok(Self::new(Arc::new(client)).with_timeout(config.timeout))
    }

    /// Set the timeout passed with container state changes
    pub fn with_timeout(mut self, timeout: i32) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> i32 {
        self.timeout
    }

    // --------------------------------------------------------------------------------------------
    // Containers
    // --------------------------------------------------------------------------------------------

    /// Names of all containers on the host
    pub async fn container_list(&self) -> DriverResult<Vec<String>> {
        self.observe("container_list", async {
            self.api
                .container_list()
                .await
                .map_err(translate("container_list", "container_list", "host"))
        })
        .await
    }

    /// Whether the container exists on the host
    pub async fn container_defined(&self, name: &str, instance: &Instance) -> DriverResult<bool> {
        self.observe("container_defined", async {
            let defined = self
                .api
                .container_defined(name)
                .await
                .map_err(translate("container_defined", "container_defined", &instance.name))?;
            debug!("Container {} defined: {}", name, defined);
            Ok(defined)
        })
        .await
    }

    /// Whether the container is running
    pub async fn container_running(&self, name: &str, instance: &Instance) -> DriverResult<bool> {
        self.observe("container_running", async {
            self.api
                .container_running(name)
                .await
                .map_err(translate("container_running", "container_running", &instance.name))
        })
        .await
    }

    /// Raw state of the container
    pub async fn container_state(
        &self,
        name: &str,
        instance: &Instance,
    ) -> DriverResult<LxdResponse> {
        self.observe("container_state", async {
            self.api
                .container_state(name)
                .await
                .map_err(translate("container_state", "container_state", &instance.name))
        })
        .await
    }

    /// Start the container and wait for it to come up
    pub async fn container_start(&self, name: &str, instance: &Instance) -> DriverResult<()> {
        self.observe("container_start", async {
            info!("Starting container {} for instance {}", name, instance);
            self.run_action(
                "container_start",
                "container_start",
                instance,
                self.api.container_start(name, self.timeout),
            )
            .await?;
            info!("Started container {}", name);
            Ok(())
        })
        .await
    }

    /// Stop the container and wait for it to halt
    pub async fn container_stop(&self, name: &str, instance: &Instance) -> DriverResult<()> {
        self.observe("container_stop", async {
            info!("Stopping container {} for instance {}", name, instance);
            self.run_action(
                "container_stop",
                "container_stop",
                instance,
                self.api.container_stop(name, self.timeout),
            )
            .await
        })
        .await
    }

    /// Restart the container
    pub async fn container_reboot(&self, name: &str, instance: &Instance) -> DriverResult<()> {
        self.observe("container_reboot", async {
            info!("Rebooting container {} for instance {}", name, instance);
            self.run_action(
                "container_reboot",
                "container_reboot",
                instance,
                self.api.container_reboot(name, self.timeout),
            )
            .await
        })
        .await
    }

    /// Freeze all processes of the container
    pub async fn container_pause(&self, name: &str, instance: &Instance) -> DriverResult<()> {
        self.observe("container_pause", async {
            info!("Pausing container {} for instance {}", name, instance);
            self.run_action(
                "container_freeze",
                "container_pause",
                instance,
                self.api.container_freeze(name, self.timeout),
            )
            .await
        })
        .await
    }

    /// Thaw a frozen container
    pub async fn container_unpause(&self, name: &str, instance: &Instance) -> DriverResult<()> {
        self.observe("container_unpause", async {
            info!("Unpausing container {} for instance {}", name, instance);
            self.run_action(
                "container_unfreeze",
                "container_unpause",
                instance,
                self.api.container_unfreeze(name, self.timeout),
            )
            .await
        })
        .await
    }

    /// Stop, then delete the container
    ///
    /// Destroy is not attempted when the stop fails.
    pub async fn container_destroy(&self, name: &str, instance: &Instance) -> DriverResult<()> {
        self.observe("container_destroy", async {
            info!("Destroying container {} for instance {}", name, instance);
            self.run_action(
                "container_stop",
                "container_destroy",
                instance,
                self.api.container_stop(name, self.timeout),
            )
            .await?;
            self.run_action(
                "container_destroy",
                "container_destroy",
                instance,
                self.api.container_destroy(name),
            )
            .await?;
            info!("Destroyed container {}", name);
            Ok(())
        })
        .await
    }

    /// Create a container from `config` and confirm the creation succeeded
    ///
    /// Nothing is cleaned up on failure.
    pub async fn container_init(&self, config: &Value, instance: &Instance) -> DriverResult<()> {
        self.observe("container_init", async {
            info!(
                "Creating container for instance {} from image {}",
                instance, instance.image_ref
            );
            let response = self
                .api
                .container_init(config)
                .await
                .map_err(translate("container_init", "container_init", &instance.name))?;
            let handle = operation_handle(&response, "container_init", instance)?;
            let finished = self.await_operation(&handle, instance).await?;

            let info = self
                .api
                .operation_info(&handle)
                .await
                .map_err(translate("operation_info", "container_init", &instance.name))?;
            // A failed wait still reads the operation for LXD's error text
            if !finished || info.metadata_status_code() != Some(StatusCode::Success.code()) {
                return Err(DriverError::ContainerCreate {
                    instance: instance.name.clone(),
                    message: operation_error_text(&info),
                });
            }

            info!("Created container for instance {}", instance.name);
            Ok(())
        })
        .await
    }

    /// Replace the container definition and wait for LXD to apply it
    pub async fn container_update(&self, config: &Value, instance: &Instance) -> DriverResult<()> {
        self.observe("container_update", async {
            info!("Updating container for instance {}", instance);
            self.run_action(
                "container_update",
                "container_update",
                instance,
                self.api.container_update(&instance.name, config),
            )
            .await
        })
        .await
    }

    // --------------------------------------------------------------------------------------------
    // Operations
    // --------------------------------------------------------------------------------------------

    /// Block until the operation finishes successfully
    pub async fn operation_wait(&self, operation_id: &str, instance: &Instance) -> DriverResult<()> {
        self.observe("operation_wait", self.wait(operation_id, instance))
            .await
    }

    /// Raw description of a background operation
    pub async fn operation_info(
        &self,
        operation_id: &str,
        instance: &Instance,
    ) -> DriverResult<LxdResponse> {
        self.observe("operation_info", async {
            self.api
                .operation_info(operation_id)
                .await
                .map_err(translate("operation_info", "operation_info", &instance.name))
        })
        .await
    }

    // --------------------------------------------------------------------------------------------
    // Images
    // --------------------------------------------------------------------------------------------

    /// Whether the instance's image is available under its alias
    pub async fn image_defined(&self, instance: &Instance) -> DriverResult<bool> {
        self.observe("image_defined", async {
            self.api
                .alias_defined(&instance.image_ref)
                .await
                .map_err(translate("alias_defined", "image_defined", &instance.name))
        })
        .await
    }

    /// Create an image alias
    pub async fn create_alias(&self, alias: &Value, instance: &Instance) -> DriverResult<bool> {
        self.observe("create_alias", async {
            self.api
                .alias_create(alias)
                .await
                .map_err(translate("alias_create", "create_alias", &instance.name))
        })
        .await
    }

    // --------------------------------------------------------------------------------------------
    // Profiles
    // --------------------------------------------------------------------------------------------

    /// Names of all profiles on the host
    pub async fn profile_list(&self) -> DriverResult<Vec<String>> {
        self.observe("profile_list", async {
            self.api
                .profile_list()
                .await
                .map_err(translate("profile_list", "profile_list", "host"))
        })
        .await
    }

    /// Whether a profile named after the instance exists
    pub async fn profile_defined(&self, instance: &Instance) -> DriverResult<bool> {
        self.observe(
            "profile_defined",
            self.profile_exists("profile_defined", instance),
        )
        .await
    }

    /// Create the instance profile; fails if it already exists
    pub async fn profile_create(
        &self,
        config: &Value,
        instance: &Instance,
    ) -> DriverResult<LxdResponse> {
        self.observe("profile_create", async {
            if self.profile_exists("profile_create", instance).await? {
                return Err(DriverError::ProfileExists(instance.name.clone()));
            }
            info!("Creating profile for instance {}", instance);
            self.api
                .profile_create(config)
                .await
                .map_err(translate("profile_create", "profile_create", &instance.name))
        })
        .await
    }

    /// Delete the instance profile if it exists
    pub async fn profile_delete(&self, instance: &Instance) -> DriverResult<()> {
        self.observe("profile_delete", async {
            if !self.profile_exists("profile_delete", instance).await? {
                debug!("No profile to delete for instance {}", instance.name);
                return Ok(());
            }
            info!("Deleting profile for instance {}", instance);
            self.api
                .profile_delete(&instance.name)
                .await
                .map_err(translate("profile_delete", "profile_delete", &instance.name))?;
            Ok(())
        })
        .await
    }

    // --------------------------------------------------------------------------------------------
    // Helpers
    // --------------------------------------------------------------------------------------------

    /// Run a session call and record its outcome
    async fn observe<T, F>(&self, operation: &'static str, call: F) -> DriverResult<T>
    where
        F: Future<Output = DriverResult<T>>,
    {
        let result = call.await;
        metrics::record_call(operation, result.is_ok());
        result
    }

    /// Issue a mutating request, then wait on the operation it started
    async fn run_action<F>(
        &self,
        call: &'static str,
        operation: &'static str,
        instance: &Instance,
        request: F,
    ) -> DriverResult<()>
    where
        F: Future<Output = Result<LxdResponse, ApiError>>,
    {
        let response = request
            .await
            .map_err(translate(call, operation, &instance.name))?;
        let handle = operation_handle(&response, operation, instance)?;
        self.wait(&handle, instance).await
    }

    async fn wait(&self, operation_id: &str, instance: &Instance) -> DriverResult<()> {
        if self.await_operation(operation_id, instance).await? {
            Ok(())
        } else {
            error!(
                "Operation {} for instance {} did not succeed",
                operation_id, instance.name
            );
            Err(DriverError::OperationFailed {
                operation_id: operation_id.to_string(),
                instance: instance.name.clone(),
                expected: OPERATION_SUCCESS,
            })
        }
    }

    /// Wait for the operation; `true` when it finished with the expected status
    async fn await_operation(&self, operation_id: &str, instance: &Instance) -> DriverResult<bool> {
        debug!("Waiting on operation {} for {}", operation_id, instance.name);
        let _timer = metrics::OPERATION_WAIT_SECONDS.start_timer();
        self.api
            .wait_container_operation(operation_id, OPERATION_SUCCESS, WAIT_FOREVER)
            .await
            .map_err(translate("wait_container_operation", "operation_wait", &instance.name))
    }

    async fn profile_exists(
        &self,
        operation: &'static str,
        instance: &Instance,
    ) -> DriverResult<bool> {
        let profiles = self
            .api
            .profile_list()
            .await
            .map_err(translate("profile_list", operation, &instance.name))?;
        Ok(profiles.iter().any(|p| *p == instance.name))
    }
}

/// Map a remote failure of `call` to the driver error for `operation`
fn translate(
    call: &'static str,
    operation: &'static str,
    target: &str,
) -> impl FnOnce(ApiError) -> DriverError {
    let target = target.to_string();
    move |err| {
        error!("Error from LXD during {} ({}) for {}: {}", operation, call, target, err);
        metrics::record_api_error(call);
        DriverError::api(operation, target, err)
    }
}

fn operation_handle(
    response: &LxdResponse,
    operation: &'static str,
    instance: &Instance,
) -> DriverResult<String> {
    response
        .operation()
        .map(str::to_string)
        .ok_or_else(|| DriverError::MissingOperation {
            operation,
            instance: instance.name.clone(),
        })
}

/// Failure text LXD attached to an operation
fn operation_error_text(info: &LxdResponse) -> String {
    info.metadata()
        .and_then(|m| m.get("err"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .unwrap_or("unknown error")
        .to_string()
}
