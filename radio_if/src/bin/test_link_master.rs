//! Simple master-side link test
//!
//! Emulates the radio bridge from the master's side of the PAIR link: lines
//! typed on stdin are framed as datagrams and sent to the robot, and anything
//! the robot sends back is printed.

use std::io::{self, BufRead, Write};

use byteorder::{ByteOrder, LittleEndian};
use radio_if::net::{zmq, Mac};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "test_link_master")]
struct Opts {
    /// Endpoint of the robot's PAIR socket
    #[structopt(short, long, default_value = "tcp://localhost:5011")]
    endpoint: String,

    /// MAC address presented as the datagram source
    #[structopt(short, long, default_value = "A4:CF:12:9B:00:FE")]
    mac: Mac,

    /// Signal strength attached to each datagram, in dBm
    #[structopt(short, long, default_value = "-55", allow_hyphen_values = true)]
    rssi: i32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::from_args();

    // Create the context and socket for zmq
    let ctx = zmq::Context::new();
    let socket = ctx.socket(zmq::PAIR)?;
    socket.set_linger(1)?;
    socket.connect(&opts.endpoint)?;

    println!("Master link to {} as {}", opts.endpoint, opts.mac);
    println!("Type a payload and press enter, or \"exit\" to quit");

    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let payload = line.trim_end_matches('\n');

        if payload == "exit" {
            break;
        }
        if payload.is_empty() {
            continue;
        }

        // Frame the datagram as the bridge would: source, payload, rssi
        let mut rssi_frame = [0u8; 4];
        LittleEndian::write_i32(&mut rssi_frame, opts.rssi);

        let frames: Vec<Vec<u8>> = vec![
            opts.mac.0.to_vec(),
            payload.as_bytes().to_vec(),
            rssi_frame.to_vec(),
        ];

        socket.send_multipart(frames, 0)?;

        // Drain whatever the robot sends back before prompting again
        while socket.poll(zmq::POLLIN, 200)? > 0 {
            let reply = socket.recv_bytes(0)?;

            match std::str::from_utf8(&reply) {
                Ok(s) => println!("< {}", s),
                Err(_) => println!("< {} undecodable bytes", reply.len()),
            }
        }
    }

    Ok(())
}
