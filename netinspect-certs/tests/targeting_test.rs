mod common;

use common::{device_csr, test_logger, with_crlf, FakeAndroid, FakeIos};
use netinspect_certs::{ClientOs, DeviceTargetResolver, ProvisionError};
use std::sync::Arc;

const APP: &str = "com.example.app";
const APP_DIR: &str = "/data/data/com.example.app/files/sonar/";
const CSR_PATH: &str = "/data/data/com.example.app/files/sonar/app.csr";

fn resolver(android: FakeAndroid, ios: FakeIos) -> (DeviceTargetResolver, Arc<FakeAndroid>, Arc<FakeIos>) {
    let android = Arc::new(android);
    let ios = Arc::new(ios);
    let resolver = DeviceTargetResolver::new(android.clone(), ios.clone(), &test_logger());
    (resolver, android, ios)
}

#[tokio::test]
async fn no_android_devices() {
    let (resolver, _, _) = resolver(FakeAndroid::new(), FakeIos::new());
    let err = resolver
        .resolve(ClientOs::Android, APP_DIR, APP, &device_csr(APP))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No Android devices found");
}

#[tokio::test]
async fn single_matching_android_device() {
    let csr = device_csr(APP);
    let android = FakeAndroid::new()
        .with_device("emulator-5554")
        .with_file("emulator-5554", CSR_PATH, &device_csr(APP))
        .with_device("R58M1234")
        .with_file("R58M1234", CSR_PATH, &with_crlf(&csr));
    let (resolver, _, _) = resolver(android, FakeIos::new());

    let id = resolver
        .resolve(ClientOs::Android, APP_DIR, APP, &csr)
        .await
        .unwrap();
    assert_eq!(id, "R58M1234");
}

#[tokio::test]
async fn two_matching_devices_pick_the_first() {
    let csr = device_csr(APP);
    let android = FakeAndroid::new()
        .with_device("first")
        .with_file("first", CSR_PATH, &csr)
        .with_device("second")
        .with_file("second", CSR_PATH, &csr);
    let (resolver, _, _) = resolver(android, FakeIos::new());

    let id = resolver
        .resolve(ClientOs::Android, APP_DIR, APP, &csr)
        .await
        .unwrap();
    assert_eq!(id, "first");
}

#[tokio::test]
async fn a_failing_device_does_not_hide_a_match() {
    let csr = device_csr(APP);
    let android = FakeAndroid::new()
        .with_failing_device("flaky")
        .with_device("good")
        .with_file("good", CSR_PATH, &csr);
    let (resolver, _, _) = resolver(android, FakeIos::new());

    let id = resolver
        .resolve(ClientOs::Android, APP_DIR, APP, &csr)
        .await
        .unwrap();
    assert_eq!(id, "good");
}

#[tokio::test]
async fn device_error_is_preferred_over_no_match() {
    let android = FakeAndroid::new()
        .with_device("other")
        .with_file("other", CSR_PATH, &device_csr(APP))
        .with_failing_device("flaky");
    let (resolver, _, _) = resolver(android, FakeIos::new());

    let err = resolver
        .resolve(ClientOs::Android, APP_DIR, APP, &device_csr(APP))
        .await
        .unwrap_err();
    match err {
        ProvisionError::DevicePull {
            device_id,
            app_name,
            ..
        } => {
            assert_eq!(device_id, "flaky");
            assert_eq!(app_name, APP);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn no_match_names_the_app() {
    let android = FakeAndroid::new()
        .with_device("other")
        .with_file("other", CSR_PATH, &device_csr(APP));
    let (resolver, _, _) = resolver(android, FakeIos::new());

    let err = resolver
        .resolve(ClientOs::Android, APP_DIR, APP, &device_csr(APP))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No matching device found for app: com.example.app");
}

#[tokio::test]
async fn desktop_apps_need_no_lookup() {
    let (resolver, android, ios) = resolver(FakeAndroid::new(), FakeIos::new());
    let csr = device_csr(APP);

    assert_eq!(
        resolver.resolve(ClientOs::MacOs, "/tmp/x/", APP, &csr).await.unwrap(),
        ""
    );
    assert_eq!(
        resolver.resolve(ClientOs::Windows, "C:/x/", APP, &csr).await.unwrap(),
        "unknown"
    );
    assert_eq!(android.calls(), 0);
    assert_eq!(ios.calls(), 0);
}

#[tokio::test]
async fn ios_simulator_id_comes_from_the_path() {
    let (resolver, _, ios) = resolver(FakeAndroid::new(), FakeIos::new().with_target("ignored"));
    let dir = "/Users/dev/Library/Developer/CoreSimulator/Devices/9A1C-55/data/Containers/Data/Application/XX/Documents/sonar/";

    let id = resolver
        .resolve(ClientOs::Ios, dir, APP, &device_csr(APP))
        .await
        .unwrap();
    assert_eq!(id, "9A1C-55");
    assert_eq!(ios.calls(), 0);
}

#[tokio::test]
async fn ios_physical_device_is_found_by_pulling_its_csr() {
    let csr = device_csr(APP);
    let ios = FakeIos::new()
        .with_target("00008110-A")
        .with_target("00008110-B")
        .with_file("00008110-B", "Documents/sonar/app.csr", &with_crlf(&csr));
    let (resolver, _, _) = resolver(FakeAndroid::new(), ios);

    let id = resolver
        .resolve(
            ClientOs::Ios,
            "/private/var/mobile/Containers/Data/Application/4D3E/Documents/sonar/",
            APP,
            &csr,
        )
        .await
        .unwrap();
    assert_eq!(id, "00008110-B");
}

#[tokio::test]
async fn no_ios_devices() {
    let (resolver, _, _) = resolver(FakeAndroid::new(), FakeIos::new());
    let err = resolver
        .resolve(
            ClientOs::Ios,
            "/private/var/mobile/Containers/Data/Application/4D3E/Documents/",
            APP,
            &device_csr(APP),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No iOS devices found");
}
