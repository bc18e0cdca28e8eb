//! Native webcam backend built on `nokhwa`.

use super::device::{
    AcquireError, DeviceInfo, MediaDevices, MediaStream, StreamSettings, VideoConstraints,
};
use super::Frame;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
    Camera, NokhwaError,
};

fn classify(error: NokhwaError) -> AcquireError {
    let message = error.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        AcquireError::Denied
    } else if lower.contains("busy") || lower.contains("in use") {
        AcquireError::InUse
    } else if lower.contains("not found") || lower.contains("no such") {
        AcquireError::NotFound
    } else {
        AcquireError::Other(message)
    }
}

/// System webcams. Native devices do not report a facing mode, so
/// switching always cycles device indices.
#[derive(Debug, Default)]
pub struct NativeMediaDevices;

impl NativeMediaDevices {
    pub fn new() -> Self {
        Self
    }
}

impl MediaDevices for NativeMediaDevices {
    type Stream = NativeStream;

    fn is_supported(&self) -> bool {
        true
    }

    fn get_user_media(
        &mut self,
        constraints: &VideoConstraints,
    ) -> Result<NativeStream, AcquireError> {
        let index = match &constraints.device_id {
            Some(id) => id
                .parse::<u32>()
                .map(CameraIndex::Index)
                .unwrap_or_else(|_| CameraIndex::String(id.clone())),
            None => CameraIndex::Index(0),
        };

        let requested = match (constraints.ideal_width, constraints.ideal_height) {
            (Some(width), Some(height)) => {
                let format = CameraFormat::new(
                    Resolution::new(width, height),
                    FrameFormat::MJPEG,
                    constraints.frame_rate.unwrap_or(30),
                );
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format))
            }
            _ => RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        };

        let mut camera = Camera::new(index.clone(), requested).map_err(|e| match classify(e) {
            AcquireError::Other(reason) if constraints.has_resolution() => {
                AcquireError::Overconstrained(reason)
            }
            other => other,
        })?;
        camera.open_stream().map_err(classify)?;

        let resolution = camera.resolution();
        tracing::info!(
            index = %index,
            width = resolution.width(),
            height = resolution.height(),
            "Native camera opened"
        );

        Ok(NativeStream {
            settings: StreamSettings {
                width: resolution.width(),
                height: resolution.height(),
                facing: None,
                device_id: index.as_string(),
            },
            camera,
            sequence: 0,
        })
    }

    fn enumerate_video_inputs(&mut self) -> Result<Vec<DeviceInfo>, AcquireError> {
        let cameras = nokhwa::query(ApiBackend::Auto).map_err(classify)?;
        Ok(cameras
            .iter()
            .map(|c| DeviceInfo {
                device_id: c.index().as_string(),
                label: c.human_name(),
                facing: None,
            })
            .collect())
    }
}

/// An open native camera stream.
pub struct NativeStream {
    camera: Camera,
    settings: StreamSettings,
    sequence: u64,
}

impl MediaStream for NativeStream {
    fn settings(&self) -> StreamSettings {
        self.settings.clone()
    }

    fn is_live(&self) -> bool {
        self.camera.is_stream_open()
    }

    fn grab_frame(&mut self) -> Result<Frame, AcquireError> {
        if !self.camera.is_stream_open() {
            return Err(AcquireError::Ended);
        }
        let buffer = self.camera.frame().map_err(classify)?;
        let decoded = buffer.decode_image::<RgbFormat>().map_err(classify)?;
        let (width, height) = (decoded.width(), decoded.height());
        self.sequence += 1;
        Ok(Frame::new(decoded.into_raw(), width, height, self.sequence))
    }

    fn stop(&mut self) {
        if self.camera.is_stream_open() {
            if let Err(e) = self.camera.stop_stream() {
                tracing::warn!(error = %e, "Failed to stop native camera stream");
            }
        }
    }
}
