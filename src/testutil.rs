// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::collections::HashMap;
use std::io::{self, Cursor};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::fetch::{FetchError, Fetcher};

/// Wait for the given async predicate to return true or fail.
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        if start.elapsed() > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Encodes the given channels as a 32 bit float WAV file in memory. All channels must
/// be the same length.
pub fn wav_bytes(channels: &[Vec<f32>], sample_rate: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("unable to create writer");
        let frames = channels.first().map(Vec::len).unwrap_or(0);
        for frame in 0..frames {
            for channel in channels {
                writer
                    .write_sample(channel[frame])
                    .expect("unable to write sample");
            }
        }
        writer.finalize().expect("unable to finalize WAV");
    }
    cursor.into_inner()
}

/// A canned response for a locator.
#[derive(Clone)]
pub enum TestResponse {
    Bytes(Vec<u8>),
    Status(u16),
    Unreachable,
    /// The fetch panics.
    Panic,
}

/// A fetcher that serves canned responses and counts calls per locator. A gated fetcher
/// holds every fetch until `release` is called.
pub struct TestFetcher {
    responses: Mutex<HashMap<String, TestResponse>>,
    calls: Mutex<HashMap<String, usize>>,
    gate: Option<Semaphore>,
}

impl TestFetcher {
    pub fn new() -> TestFetcher {
        TestFetcher {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            gate: None,
        }
    }

    pub fn gated() -> TestFetcher {
        TestFetcher {
            gate: Some(Semaphore::new(0)),
            ..TestFetcher::new()
        }
    }

    /// Sets (or replaces) the response for a locator. Unknown locators get a 404.
    pub fn respond(&self, locator: &str, response: TestResponse) {
        self.responses
            .lock()
            .insert(locator.to_string(), response);
    }

    /// Lets all held and future fetches through.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1024);
        }
    }

    pub fn calls(&self, locator: &str) -> usize {
        self.calls.lock().get(locator).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Fetcher for TestFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        *self.calls.lock().entry(locator.to_string()).or_insert(0) += 1;

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("gate closed")
                .forget();
        }

        let response = self.responses.lock().get(locator).cloned();
        match response {
            Some(TestResponse::Bytes(bytes)) => Ok(bytes),
            Some(TestResponse::Status(status)) => Err(FetchError::Status { status }),
            Some(TestResponse::Unreachable) => Err(FetchError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            Some(TestResponse::Panic) => panic!("fetch of {} panicked", locator),
            None => Err(FetchError::Status { status: 404 }),
        }
    }
}
