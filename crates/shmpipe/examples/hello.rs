//! Two threads, one channel: write a handful of messages and drain them.

use shmpipe::{ChannelConfig, ShmChannel};

fn main() {
    let channel = ShmChannel::create(ChannelConfig::default()).expect("failed to create channel");
    let (mut tx, mut rx) = channel.into_split();

    let producer = std::thread::spawn(move || {
        let messages: Vec<&[u8]> = vec![
            b"hello world 1",
            b"hello world 2",
            b"hello world 3",
            b"hello world 4",
            b"hello world 5",
        ];
        for msg in messages {
            tx.send(msg).expect("send failed");
            println!("Wrote {} bytes: {}", msg.len(), String::from_utf8_lossy(msg));
        }
        // tx drops here: the channel closes and the consumer sees EOF once
        // it has drained everything.
    });

    let mut buf = [0u8; 1024];
    loop {
        let n = rx.recv(&mut buf);
        if n == 0 {
            break;
        }
        println!("Read {} bytes: {}", n, String::from_utf8_lossy(&buf[..n]));
    }

    producer.join().unwrap();
}
