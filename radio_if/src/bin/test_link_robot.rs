//! Simple robot-side link test
//!
//! Runs the protocol handler over a real PAIR socket with no robot behind
//! it: decoded events are printed, simple tokens are acknowledged, and a
//! fake sensor reading goes out once a second. Pair with `test_link_master`
//! in another terminal.

use std::time::{Duration, Instant};

use radio_if::handler::ProtocolHandler;
use radio_if::net::{zmq, NetParams, ZmqLink};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let params = NetParams {
        link_endpoint: String::from("tcp://*:5011"),
        link_bind: true,
        master_mac: String::from("A4:CF:12:9B:00:FE"),
    };

    let ctx = zmq::Context::new();
    let link = ZmqLink::new(&ctx, &params)?;
    let mut handler = ProtocolHandler::new(link);

    println!("Robot link on {}", params.link_endpoint);

    let mut last_sensor_data = Instant::now();
    let mut fake_distance_cm = 120.0;

    loop {
        match handler.receive(100) {
            Ok(Some(event)) => println!("event: {:?}", event),
            Ok(None) => (),
            Err(e) => println!("receive error: {}", e),
        }

        // Fake telemetry so the master side has something to print
        if last_sensor_data.elapsed() > Duration::from_secs(1) {
            fake_distance_cm = if fake_distance_cm < 10.0 {
                120.0
            }
            else {
                fake_distance_cm - 5.0
            };

            if let Err(e) = handler.send_sensor_data(fake_distance_cm, 21.5, "OK") {
                println!("send error: {}", e);
            }

            last_sensor_data = Instant::now();
        }
    }
}
