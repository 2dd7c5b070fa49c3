//! HTTP(S) stream backend.
//!
//! The whole payload is fetched by a background worker thread on
//! construction; [`crate::io::Stream::size`] and the first read block
//! until the fetch signals completion through a mutex + condition
//! variable. All subsequent reads and seeks are in-memory.

use std::io::SeekFrom;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{Error, Result};
use crate::io::stream::resolve_seek;
use crate::io::{Mode, Stream};
use crate::uri::Uri;

#[derive(Default)]
struct FetchState {
    payload: Option<std::result::Result<Arc<[u8]>, String>>,
}

struct Shared {
    state: Mutex<FetchState>,
    done: Condvar,
}

pub struct HttpStream {
    location: Uri,
    shared: Arc<Shared>,
    cache: Option<Arc<[u8]>>,
    cursor: u64,
    eof: bool,
}

/// Starts an asynchronous fetch of the given URL.
///
/// # Errors
///
/// Fails with `not_implemented` when a writable mode is requested. Network
/// failures surface from the first blocking accessor instead.
pub fn create(location: &Uri, mode: Mode) -> Result<Box<dyn Stream>> {
    if mode.intersects(Mode::OUT | Mode::APP | Mode::TRUNC) {
        return Err(Error::not_implemented(
            "HTTP(S) stream writing is not implemented",
        ));
    }

    let shared = Arc::new(Shared {
        state: Mutex::new(FetchState::default()),
        done: Condvar::new(),
    });

    let url = location.as_str().to_owned();
    let worker = Arc::clone(&shared);
    std::thread::spawn(move || {
        let outcome = fetch(&url);
        match &outcome {
            Ok(payload) => debug!("fetched {} bytes from {url}", payload.len()),
            Err(e) => warn!("fetch of {url} failed: {e}"),
        }
        let mut state = worker.state.lock().expect("fetch state poisoned");
        state.payload = Some(outcome);
        worker.done.notify_all();
    });

    Ok(Box::new(HttpStream {
        location: location.clone(),
        shared,
        cache: None,
        cursor: 0,
        eof: false,
    }))
}

fn fetch(url: &str) -> std::result::Result<Arc<[u8]>, String> {
    let response = reqwest::blocking::get(url).map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("server returned {status}"));
    }
    let bytes = response.bytes().map_err(|e| e.to_string())?;
    Ok(Arc::from(bytes.as_ref()))
}

impl HttpStream {
    /// Blocks until the background fetch completes.
    fn payload(&mut self) -> Result<Arc<[u8]>> {
        if let Some(cache) = &self.cache {
            return Ok(Arc::clone(cache));
        }

        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| Error::failure("fetch state poisoned"))?;
        while state.payload.is_none() {
            state = self
                .shared
                .done
                .wait(state)
                .map_err(|_| Error::failure("fetch state poisoned"))?;
        }

        match state.payload.as_ref().expect("fetch completed") {
            Ok(payload) => {
                let payload = Arc::clone(payload);
                self.cache = Some(Arc::clone(&payload));
                Ok(payload)
            }
            Err(e) => Err(Error::read_fault(e.clone())),
        }
    }
}

impl Stream for HttpStream {
    fn location(&self) -> Uri {
        self.location.clone()
    }

    fn eof(&mut self) -> bool {
        self.eof
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.payload()?.len() as u64)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.cursor)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let size = self.size()?;
        self.cursor = resolve_seek(pos, size, self.cursor)?;
        self.eof = false;
        Ok(self.cursor)
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<()> {
        let n = self.try_read(dst)?;
        if n != dst.len() {
            return Err(Error::end_of_file("unexpected end of HTTP payload"));
        }
        Ok(())
    }

    fn try_read(&mut self, dst: &mut [u8]) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        let payload = self.payload()?;
        let start = usize::try_from(self.cursor)?;
        let remain = payload.len().saturating_sub(start);
        let n = dst.len().min(remain);
        if n < dst.len() {
            self.eof = true;
        }
        dst[..n].copy_from_slice(&payload[start..start + n]);
        self.cursor += n as u64;
        Ok(n)
    }

    fn write(&mut self, _src: &[u8]) -> Result<()> {
        Err(Error::not_implemented(
            "HTTP(S) stream writing is not implemented",
        ))
    }

    fn truncate(&mut self, _size: u64) -> Result<()> {
        Err(Error::not_implemented(
            "HTTP(S) stream truncation is not implemented",
        ))
    }
}
