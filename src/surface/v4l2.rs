//! V4L2 capture surface.
//!
//! Opens a local device node (e.g. `/dev/video0`), negotiates an RGB3, YUYV
//! or NV12 stream within the requested constraints and runs capture on a
//! dedicated thread that publishes only the newest converted frame.
//!
//! V4L2 exposes no facing metadata; the constraint is logged and the device
//! named by the URI is used as-is.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::normalize::{to_rgb, PixelFormat};
use super::{
    ready_timeout_error, CaptureSurface, DeviceLease, FrameSource, ReadySignal, StreamConstraints,
};
use crate::error::{CaptureError, CaptureErrorKind};
use crate::frame::Frame;

pub struct V4l2Surface {
    device: String,
    in_use: Arc<AtomicBool>,
}

impl V4l2Surface {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    fn open_device(&self) -> Result<v4l::Device, CaptureError> {
        v4l::Device::with_path(&self.device).map_err(|err| {
            let kind = match err.kind() {
                std::io::ErrorKind::PermissionDenied => CaptureErrorKind::PermissionDenied,
                _ => CaptureErrorKind::DeviceUnavailable,
            };
            CaptureError::new(kind, format!("open v4l2 device {}: {}", self.device, err))
        })
    }

    fn negotiate(
        &self,
        device: &v4l::Device,
        constraints: &StreamConstraints,
    ) -> Result<(u32, u32, PixelFormat), CaptureError> {
        use v4l::video::Capture;

        let negotiation = |msg: String| CaptureError::new(CaptureErrorKind::NegotiationFailed, msg);
        let (width, height) = constraints.capped_resolution();

        let mut format = device
            .format()
            .map_err(|err| negotiation(format!("read v4l2 format: {}", err)))?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Surface: failed to set format on {}: {}",
                    self.device,
                    err
                );
                device
                    .format()
                    .map_err(|err| negotiation(format!("read v4l2 format: {}", err)))?
            }
        };

        let pixel_format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"YUYV" => PixelFormat::Yuyv,
            b"NV12" => PixelFormat::Nv12,
            other => {
                return Err(negotiation(format!(
                    "{} only offers unsupported pixel format {}",
                    self.device,
                    String::from_utf8_lossy(other)
                )))
            }
        };
        if !constraints.accepts(format.width, format.height) {
            return Err(negotiation(format!(
                "{} negotiated {}x{}, above the {}x{} cap",
                self.device,
                format.width,
                format.height,
                constraints.max_width,
                constraints.max_height
            )));
        }
        Ok((format.width, format.height, pixel_format))
    }
}

impl CaptureSurface for V4l2Surface {
    fn name(&self) -> &str {
        &self.device
    }

    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn FrameSource>, CaptureError> {
        if constraints.audio {
            return Err(CaptureError::new(
                CaptureErrorKind::NegotiationFailed,
                "v4l2 capture has no audio track",
            ));
        }
        let lease = DeviceLease::acquire(&self.in_use, &self.device)?;
        let device = self.open_device()?;
        log::debug!(
            "V4l2Surface: facing {:?} requested; using {}",
            constraints.facing,
            self.device
        );
        let (width, height, format) = self.negotiate(&device, constraints)?;

        let shared = Arc::new(Mutex::new(LatestFrame::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let ready = ReadySignal::new();

        let worker = CaptureWorker {
            device,
            width,
            height,
            format,
            shared: shared.clone(),
            stop: stop.clone(),
            ready: ready.clone(),
        };
        let join = std::thread::Builder::new()
            .name(format!("v4l2-capture:{}", self.device))
            .spawn(move || worker.run())
            .map_err(|err| {
                CaptureError::new(
                    CaptureErrorKind::DeviceUnavailable,
                    format!("spawn capture thread: {}", err),
                )
            })?;

        log::info!(
            "V4l2Surface: opened {} ({}x{} {:?})",
            self.device,
            width,
            height,
            format
        );

        Ok(Box::new(V4l2Source {
            name: self.device.clone(),
            lease: Some(lease),
            shared,
            stop,
            ready,
            join: Some(join),
            frame: Frame::empty(width, height),
            width,
            height,
            last_sequence: 0,
        }))
    }

    fn in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct LatestFrame {
    rgb: Vec<u8>,
    sequence: u64,
    error: Option<String>,
}

struct CaptureWorker {
    device: v4l::Device,
    width: u32,
    height: u32,
    format: PixelFormat,
    shared: Arc<Mutex<LatestFrame>>,
    stop: Arc<AtomicBool>,
    ready: ReadySignal,
}

impl CaptureWorker {
    fn run(self) {
        use v4l::buffer::Type;
        use v4l::io::traits::CaptureStream;

        let mut stream = match v4l::prelude::MmapStream::with_buffers(
            &self.device,
            Type::VideoCapture,
            4,
        ) {
            Ok(stream) => stream,
            Err(err) => {
                self.publish_error(format!("create v4l2 buffer stream: {}", err));
                return;
            }
        };

        let mut rgb = Vec::new();
        let mut sequence = 0u64;
        while !self.stop.load(Ordering::Acquire) {
            let converted = stream
                .next()
                .map_err(|err| anyhow!("capture v4l2 frame: {}", err))
                .and_then(|(buf, _meta)| {
                    let len = self.format.frame_len(self.width, self.height)?;
                    let buf = buf.get(..len).unwrap_or(buf);
                    to_rgb(buf, self.width, self.height, self.format, &mut rgb)
                });
            match converted {
                Ok(()) => {
                    sequence += 1;
                    if let Ok(mut latest) = self.shared.lock() {
                        std::mem::swap(&mut latest.rgb, &mut rgb);
                        latest.sequence = sequence;
                        latest.error = None;
                    }
                    if sequence == 1 {
                        self.ready.fire();
                    }
                }
                Err(err) => {
                    self.publish_error(err.to_string());
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        }
    }

    fn publish_error(&self, message: String) {
        log::warn!("V4l2Surface: {}", message);
        if let Ok(mut latest) = self.shared.lock() {
            latest.error = Some(message);
        }
    }
}

struct V4l2Source {
    name: String,
    lease: Option<DeviceLease>,
    shared: Arc<Mutex<LatestFrame>>,
    stop: Arc<AtomicBool>,
    ready: ReadySignal,
    join: Option<JoinHandle<()>>,
    frame: Frame,
    width: u32,
    height: u32,
    last_sequence: u64,
}

impl FrameSource for V4l2Source {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        if self.ready.wait(timeout) {
            return Ok(());
        }
        if let Some(message) = self.shared.lock().ok().and_then(|l| l.error.clone()) {
            return Err(CaptureError::new(CaptureErrorKind::DeviceUnavailable, message));
        }
        Err(ready_timeout_error(&self.name, timeout))
    }

    fn latest_frame(&mut self) -> Result<Option<&Frame>> {
        if self.lease.is_none() {
            return Err(anyhow!("{} is closed", self.name));
        }
        let latest = self
            .shared
            .lock()
            .map_err(|_| anyhow!("{} frame slot poisoned", self.name))?;
        if latest.sequence > self.last_sequence {
            self.frame
                .refill(&latest.rgb, self.width, self.height, latest.sequence)?;
            self.last_sequence = latest.sequence;
            return Ok(Some(&self.frame));
        }
        if let Some(message) = &latest.error {
            return Err(anyhow!("{}: {}", self.name, message));
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("V4l2Surface: capture thread for {} panicked", self.name);
            }
        }
        if self.lease.take().is_some() {
            log::info!("V4l2Surface: closed {}", self.name);
        }
    }

    fn is_closed(&self) -> bool {
        self.lease.is_none()
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.close();
    }
}
