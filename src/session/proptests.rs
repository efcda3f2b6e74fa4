// Property-based tests for session call ordering

use super::*;
use crate::lxd::fake::{Call, FakeLxd, Reply, FAKE_OPERATION};
use proptest::prelude::*;
use serde_json::json;

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn wait_call() -> Call {
    Call::WaitContainerOperation(FAKE_OPERATION.to_string(), 200, -1)
}

fn container_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,30}"
}

proptest! {
    #[test]
    fn prop_container_defined_returns_remote_answer(name in container_name(), defined in any::<bool>()) {
        let fake = Arc::new(FakeLxd::new());
        fake.returns("container_defined", Reply::Bool(defined));
        let session = LxdSession::new(fake.clone());
        let instance = Instance::new(name.clone(), "img");

        let result = block_on(session.container_defined(&name, &instance)).unwrap();

        prop_assert_eq!(result, defined);
        prop_assert_eq!(fake.calls(), vec![Call::ContainerDefined(name)]);
    }

    #[test]
    fn prop_start_is_start_then_wait(name in container_name(), timeout in -1i32..600) {
        let fake = Arc::new(FakeLxd::new());
        let session = LxdSession::new(fake.clone()).with_timeout(timeout);
        let instance = Instance::new(name.clone(), "img");

        block_on(session.container_start(&name, &instance)).unwrap();

        prop_assert_eq!(
            fake.calls(),
            vec![Call::ContainerStart(name, timeout), wait_call()]
        );
    }

    #[test]
    fn prop_destroy_order(name in container_name(), stop_fails in any::<bool>()) {
        let fake = Arc::new(FakeLxd::new());
        if stop_fails {
            fake.fails("container_stop", ApiError::status(500, "Fake"));
        }
        let session = LxdSession::new(fake.clone());
        let instance = Instance::new(name.clone(), "img");

        let result = block_on(session.container_destroy(&name, &instance));

        if stop_fails {
            prop_assert!(result.is_err());
            prop_assert_eq!(fake.calls(), vec![Call::ContainerStop(name, -1)]);
        } else {
            prop_assert!(result.is_ok());
            prop_assert_eq!(
                fake.calls(),
                vec![
                    Call::ContainerStop(name.clone(), -1),
                    wait_call(),
                    Call::ContainerDestroy(name),
                    wait_call(),
                ]
            );
        }
    }

    #[test]
    fn prop_profile_create_checks_existence_first(name in container_name(), existing in prop::collection::vec(container_name(), 0..5)) {
        let fake = Arc::new(FakeLxd::new());
        fake.returns("profile_list", Reply::Names(existing.clone()));
        let session = LxdSession::new(fake.clone());
        let instance = Instance::new(name.clone(), "img");
        let config = json!({"name": name});

        let result = block_on(session.profile_create(&config, &instance));

        let calls = fake.calls();
        prop_assert_eq!(&calls[0], &Call::ProfileList);
        if existing.contains(&name) {
            prop_assert!(matches!(result, Err(DriverError::ProfileExists(_))));
            prop_assert_eq!(calls.len(), 1);
        } else {
            prop_assert!(result.is_ok());
            prop_assert_eq!(&calls[1], &Call::ProfileCreate(config));
        }
    }
}
