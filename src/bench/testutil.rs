///
/// An in-process cache server for tests: a HashMap behind the memcached
/// text protocol, enough for GET/SET and hit/miss semantics. Values never
/// expire or get evicted within a test.
///
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Store = Arc<Mutex<HashMap<String, usize>>>;

/// Binds an ephemeral port and serves exactly `n_connections` clients, each
/// on its own thread, all against one shared store. Returns the port and a
/// handle that joins once every client has disconnected.
pub fn spawn_mock_cache(n_connections: usize) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        let mut conns = Vec::with_capacity(n_connections);
        for _ in 0..n_connections {
            let (sock, _) = listener.accept().unwrap();
            let store = Arc::clone(&store);
            conns.push(thread::spawn(move || serve_connection(sock, store)));
        }
        for conn in conns {
            conn.join().unwrap();
        }
    });

    (port, handle)
}

fn serve_connection(sock: TcpStream, store: Store) {
    let mut writer = sock.try_clone().unwrap();
    let mut reader = BufReader::new(sock);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["get", key] => {
                let size = store.lock().unwrap().get(*key).copied();
                match size {
                    Some(size) => {
                        write!(writer, "VALUE {} 0 {}\r\n", key, size).unwrap();
                        writer.write_all(&vec![b'x'; size]).unwrap();
                        writer.write_all(b"\r\nEND\r\n").unwrap();
                    }
                    None => writer.write_all(b"END\r\n").unwrap(),
                }
            }
            ["set", key, _flags, _exptime, bytes] => {
                let size: usize = bytes.parse().unwrap();
                // drain the payload and its trailing CRLF
                let mut payload = vec![0u8; size + 2];
                reader.read_exact(&mut payload).unwrap();
                store.lock().unwrap().insert(key.to_string(), size);
                writer.write_all(b"STORED\r\n").unwrap();
            }
            _ => {
                writer.write_all(b"ERROR\r\n").unwrap();
            }
        }
        writer.flush().unwrap();
    }
}
