//! A minimal blocking HTTP server for exercising the download provider
//! against controlled responses: statuses, caching headers, redirects, and
//! slow bodies.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn init_logging() {
	let _ = env_logger::builder().is_test(true).try_init();
}

type Handler = Arc<dyn Fn(&str) -> HttpReply + Send + Sync>;

pub struct HttpReply {
	status: u16,
	headers: Vec<(String, String)>,
	body: Vec<u8>,
	delay: Duration,
}

impl HttpReply {
	fn ok(body: &[u8]) -> HttpReply {
		HttpReply {
			status: 200,
			headers: Vec::new(),
			body: body.to_vec(),
			delay: Duration::ZERO,
		}
	}

	fn status(status: u16) -> HttpReply {
		HttpReply {
			status,
			headers: Vec::new(),
			body: Vec::new(),
			delay: Duration::ZERO,
		}
	}

	fn redirect(location: String) -> HttpReply {
		HttpReply {
			status: 302,
			headers: vec![("Location".to_string(), location)],
			body: Vec::new(),
			delay: Duration::ZERO,
		}
	}
}

/// One listener on an ephemeral port, answering every request through the
/// configured handler and counting the requests it saw.
pub struct TestServer {
	addr: SocketAddr,
	hits: Arc<AtomicUsize>,
}

impl TestServer {
	/// 200 with the given body for every path.
	pub fn serving_tiles(body: &[u8]) -> TestServer {
		let body = body.to_vec();
		Self::spawn(Arc::new(move |_| HttpReply::ok(&body)))
	}

	/// 200 with a `Cache-Control: max-age` header.
	pub fn serving_tiles_with_max_age(body: &[u8], max_age: u64) -> TestServer {
		let body = body.to_vec();
		Self::spawn(Arc::new(move |_| {
			let mut reply = HttpReply::ok(&body);
			reply
				.headers
				.push(("Cache-Control".to_string(), format!("public, max-age={max_age}")));
			reply
		}))
	}

	/// 200 after sleeping, widening race windows deliberately.
	pub fn serving_tiles_slowly(body: &[u8], delay: Duration) -> TestServer {
		let body = body.to_vec();
		Self::spawn(Arc::new(move |_| {
			let mut reply = HttpReply::ok(&body);
			reply.delay = delay;
			reply
		}))
	}

	/// The given status for every path.
	pub fn serving_status(status: u16) -> TestServer {
		Self::spawn(Arc::new(move |_| HttpReply::status(status)))
	}

	/// Requests under `from` are redirected once into `to`, which serves
	/// the body.
	pub fn redirecting_once(from: &str, to: &str, body: &[u8]) -> TestServer {
		let from = from.to_string();
		let to = to.to_string();
		let body = body.to_vec();
		Self::spawn(Arc::new(move |path| {
			if path.starts_with(&from) {
				HttpReply::redirect(path.replacen(&from, &to, 1))
			} else if path.starts_with(&to) {
				HttpReply::ok(&body)
			} else {
				HttpReply::status(404)
			}
		}))
	}

	/// Every request redirects to itself.
	pub fn redirect_loop() -> TestServer {
		Self::spawn(Arc::new(|path| HttpReply::redirect(path.to_string())))
	}

	/// Serve a different body per path prefix, 404 otherwise.
	pub fn serving_by_prefix(routes: Vec<(String, Vec<u8>)>) -> TestServer {
		Self::spawn(Arc::new(move |path| {
			routes
				.iter()
				.find(|(prefix, _)| path.starts_with(prefix))
				.map_or(HttpReply::status(404), |(_, body)| HttpReply::ok(body))
		}))
	}

	pub fn addr(&self) -> SocketAddr {
		self.addr
	}

	/// Requests answered so far.
	pub fn hits(&self) -> usize {
		self.hits.load(Ordering::SeqCst)
	}

	fn spawn(handler: Handler) -> TestServer {
		let listener = TcpListener::bind("127.0.0.1:0").expect("binding the test server");
		let addr = listener.local_addr().unwrap();
		let hits = Arc::new(AtomicUsize::new(0));

		let accept_hits = Arc::clone(&hits);
		std::thread::spawn(move || {
			for stream in listener.incoming() {
				let Ok(stream) = stream else { continue };
				let handler = Arc::clone(&handler);
				let hits = Arc::clone(&accept_hits);
				std::thread::spawn(move || handle_connection(stream, &handler, &hits));
			}
		});

		TestServer { addr, hits }
	}
}

fn handle_connection(mut stream: TcpStream, handler: &Handler, hits: &AtomicUsize) {
	let Ok(peer) = stream.try_clone() else { return };
	let mut reader = BufReader::new(peer);

	let mut request_line = String::new();
	if reader.read_line(&mut request_line).is_err() {
		return;
	}
	// drain the request headers; tile GETs carry no body
	loop {
		let mut line = String::new();
		match reader.read_line(&mut line) {
			Ok(0) => break,
			Ok(_) if line == "\r\n" || line == "\n" => break,
			Ok(_) => {}
			Err(_) => return,
		}
	}

	let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
	hits.fetch_add(1, Ordering::SeqCst);

	let reply = handler(&path);
	if !reply.delay.is_zero() {
		std::thread::sleep(reply.delay);
	}

	let mut head = format!(
		"HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n",
		reply.status,
		reply.body.len()
	);
	for (name, value) in &reply.headers {
		head.push_str(name);
		head.push_str(": ");
		head.push_str(value);
		head.push_str("\r\n");
	}
	head.push_str("\r\n");

	let _ = stream.write_all(head.as_bytes());
	let _ = stream.write_all(&reply.body);
	let _ = stream.flush();
}
