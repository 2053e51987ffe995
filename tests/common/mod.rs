#![allow(dead_code)]

use std::net::TcpListener;
use std::thread::JoinHandle;
use std::time::Duration;

use dot_sync::sim::LoopbackCamera;
use dot_sync::CaptureSettings;

/// Serve one client from `camera` on an ephemeral port. Returns the device
/// string to connect to and the server thread (yielding captures answered).
pub fn spawn_camera(camera: LoopbackCamera) -> (String, JoinHandle<anyhow::Result<u64>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback camera");
    let addr = listener.local_addr().expect("local addr");
    let handle = std::thread::spawn(move || camera.serve_one(&listener));
    (format!("tcp://{}", addr), handle)
}

pub fn settings(device: &str) -> CaptureSettings {
    CaptureSettings {
        device: device.to_string(),
        capture_timeout: Duration::from_millis(500),
        status_wait: Duration::from_millis(50),
        settle_delay: Duration::ZERO,
        ..CaptureSettings::default()
    }
}
