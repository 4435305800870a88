//! Drive the scanner with a simulated radio.
//!
//! Feeds a few advertising reports, a central connection, a disconnect and
//! a scan timeout through the scanner and prints what happens.
//!
//! Run with: cargo run --example simulated_scan

use ble_scan_manager::ble::advertising::AddressType;
use ble_scan_manager::ble::uuids::{HEART_RATE_SERVICE, UART_SERVICE_UUID};
use ble_scan_manager::{
    AdvertisingReport, BleUuid, ConnectionHandle, ConnectionIndicator, DriverError, PeerAddress,
    RadioDriver, RadioEvent, Result, Role, RoleRegistry, ScanParameters, Scanner, TimeoutSource,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Radio that accepts every command and prints it.
struct SimulatedRadio;

impl RadioDriver for SimulatedRadio {
    fn scan_start(&self, params: &ScanParameters) -> std::result::Result<(), DriverError> {
        println!(
            "[radio] scan start: {} interval={} window={} timeout={}s",
            if params.active_scan { "active" } else { "passive" },
            params.interval,
            params.window,
            params.timeout_secs
        );
        Ok(())
    }

    fn scan_stop(&self) -> std::result::Result<(), DriverError> {
        println!("[radio] scan stop");
        Ok(())
    }
}

/// Prints LED transitions.
struct ConsoleLed;

impl ConnectionIndicator for ConsoleLed {
    fn begin_searching(&self) {
        println!("[led] blinking");
    }

    fn end_searching(&self) {
        println!("[led] blink off");
    }

    fn set_connected(&self, connected: bool) {
        println!("[led] connected = {}", connected);
    }
}

/// Tracks the role of each open connection.
#[derive(Default)]
struct Links(Mutex<HashMap<ConnectionHandle, Role>>);

impl RoleRegistry for Links {
    fn role_for_handle(&self, handle: ConnectionHandle) -> Role {
        self.0.lock().get(&handle).copied().unwrap_or_default()
    }
}

fn advertisement(name: &str, uuid16: Option<u16>, uuid128: Option<BleUuid>) -> Vec<u8> {
    let mut data = vec![2, 0x01, 0x06];
    if let Some(uuid) = uuid16 {
        data.extend_from_slice(&[3, 0x03]);
        data.extend_from_slice(&uuid.to_le_bytes());
    }
    if let Some(uuid) = uuid128 {
        data.extend_from_slice(&[17, 0x07]);
        data.extend(uuid.to_le_bytes());
    }
    data.push(name.len() as u8 + 1);
    data.push(0x09);
    data.extend_from_slice(name.as_bytes());
    data
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ble_scan_manager=debug".parse().unwrap()),
        )
        .init();

    let links = Arc::new(Links::default());
    let scanner = Scanner::new(Arc::new(SimulatedRadio), Arc::new(ConsoleLed), links.clone());

    let uart = BleUuid::from(UART_SERVICE_UUID);
    scanner.set_rx_callback(move |report| {
        let name = report.local_name().unwrap_or("<unnamed>");
        if report.contains_uuid(&HEART_RATE_SERVICE) {
            println!("  heart rate sensor {} at {} ({} dBm)", name, report.address, report.rssi);
        } else if report.contains_uuid(&uart) {
            println!("  UART peer {} at {} ({} dBm)", name, report.address, report.rssi);
        } else {
            println!("  ignoring {} at {}", name, report.address);
        }
    });
    scanner.set_timeout_callback(|| println!("  scan timed out"));
    let worker = scanner.spawn_callback_worker();

    let mut events = scanner.subscribe_events();

    scanner.set_active_scan(true);
    scanner.set_interval_ms(100, 50);
    scanner.start(30)?;

    let peers = [
        (advertisement("HRM", Some(0x180D), None), -58),
        (advertisement("NUS", None, Some(uart)), -71),
        (advertisement("Lamp", Some(0x180F), None), -80),
    ];
    for (i, (payload, rssi)) in peers.iter().enumerate() {
        let address = PeerAddress::new(AddressType::RandomStatic, [i as u8, 0, 0, 0, 0, 0xC0]);
        let report = AdvertisingReport::new(address, *rssi, payload);
        scanner.handle_event(&RadioEvent::AdvertisingReport(report));
    }

    // Connect to the heart rate sensor, then lose the link.
    let handle = ConnectionHandle(0);
    links.0.lock().insert(handle, Role::Central);
    scanner.handle_event(&RadioEvent::Connected {
        handle,
        role: Role::Central,
    });
    println!("running after connect: {}", scanner.is_running());

    scanner.handle_event(&RadioEvent::Disconnected {
        handle,
        reason: 0x08,
    });
    links.0.lock().remove(&handle);
    println!("running after disconnect: {}", scanner.is_running());

    scanner.handle_event(&RadioEvent::Timeout {
        source: TimeoutSource::Scan,
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    scanner.stop()?;

    println!("\n--- Scanner events ---");
    while let Ok(event) = events.try_recv() {
        println!("  {:?}", event);
    }

    drop(scanner);
    if let Some(worker) = worker {
        let _ = worker.await;
    }

    Ok(())
}
