//! A tiny in-process HTTP/1.1 origin that understands `Range` requests, used
//! in place of a mock-HTTP-server dependency for the integration tests below.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

pub struct Origin {
    pub url: String,
}

pub fn spawn(data: Vec<u8>) -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake origin");
    let addr = listener.local_addr().unwrap();
    let data = Arc::new(data);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let data = Arc::clone(&data);
            thread::spawn(move || serve(stream, &data, Mode::Range));
        }
    });

    Origin { url: format!("http://{addr}/resource") }
}

/// An origin that ignores `Range` entirely and answers every request with the
/// given status line and an empty body — for exercising a worker's
/// unsupported-status path.
#[allow(dead_code)]
pub fn spawn_status(status_line: &'static str) -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake origin");
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            thread::spawn(move || serve(stream, &[], Mode::AlwaysStatus(status_line)));
        }
    });

    Origin { url: format!("http://{addr}/resource") }
}

/// An origin that honors `Range` with a 206 on the first request only; every
/// request after that gets a full 200 body regardless of any `Range` header
/// it carries — for exercising the "200 after 206" discard path.
#[allow(dead_code)]
pub fn spawn_single_range_then_full(data: Vec<u8>) -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake origin");
    let addr = listener.local_addr().unwrap();
    let data = Arc::new(data);
    let requests = Arc::new(AtomicUsize::new(0));

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let data = Arc::clone(&data);
            let requests = Arc::clone(&requests);
            thread::spawn(move || serve(stream, &data, Mode::FirstRangeThenFull(requests)));
        }
    });

    Origin { url: format!("http://{addr}/resource") }
}

enum Mode {
    Range,
    AlwaysStatus(&'static str),
    FirstRangeThenFull(Arc<AtomicUsize>),
}

fn serve(stream: TcpStream, data: &[u8], mode: Mode) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut writer = stream;
    loop {
        let mut request_line = String::new();
        match reader.read_line(&mut request_line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        if request_line.trim().is_empty() {
            return;
        }

        let mut range_header = None;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                break;
            }
            if let Some(value) = trimmed.strip_prefix("Range: ").or_else(|| trimmed.strip_prefix("range: ")) {
                range_header = Some(value.to_owned());
            }
        }

        let result = match &mode {
            Mode::Range => write_response(&mut writer, data, range_header.as_deref()),
            Mode::AlwaysStatus(status_line) => write_status(&mut writer, status_line),
            Mode::FirstRangeThenFull(requests) => {
                let seen = requests.fetch_add(1, Ordering::SeqCst);
                if seen == 0 {
                    write_response(&mut writer, data, range_header.as_deref())
                } else {
                    write_response(&mut writer, data, None)
                }
            }
        };
        if result.is_err() {
            return;
        }
    }
}

fn write_status(writer: &mut TcpStream, status_line: &str) -> std::io::Result<()> {
    let head = format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: keep-alive\r\n\r\n");
    writer.write_all(head.as_bytes())?;
    writer.flush()
}

fn write_response(writer: &mut TcpStream, data: &[u8], range_header: Option<&str>) -> std::io::Result<()> {
    let total = data.len() as u64;

    let (status, body, extra_header) = match range_header.and_then(parse_range) {
        Some((first, last)) => {
            let last = last.min(total.saturating_sub(1));
            let first = first.min(last);
            let slice = &data[first as usize..=last as usize];
            ("206 Partial Content", slice, format!("Content-Range: bytes {first}-{last}/{total}\r\n"))
        }
        None => ("200 OK", data, String::new()),
    };

    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\n{extra_header}Connection: keep-alive\r\n\r\n",
        body.len()
    );
    writer.write_all(head.as_bytes())?;
    writer.write_all(body)?;
    writer.flush()
}

fn parse_range(header: &str) -> Option<(u64, u64)> {
    let spec = header.strip_prefix("bytes=")?;
    let (first, last) = spec.split_once('-')?;
    Some((first.parse().ok()?, last.parse().ok()?))
}

#[allow(dead_code)]
pub fn read_all(mut reader: impl Read, buf: &mut Vec<u8>) -> std::io::Result<()> {
    reader.read_to_end(buf)?;
    Ok(())
}
