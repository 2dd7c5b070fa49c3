//! OptimFROG demuxer (feature `optimfrog`).
//!
//! Wraps the OptimFROG SDK through its read-interface callbacks. The
//! decoder produces interleaved integer PCM in the stream's declared
//! sample type, converted to float through the PCM blitter.

use std::ffi::{c_char, c_int, c_void, CStr};

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::pcm::{self, Blitter, Spec};
use crate::audio::{codec, guess_channel_layout, Format, Packet};
use crate::error::{Error, Result};
use crate::io::Stream;
use crate::media::{ape, id3v1, Image, ImageType};

pub(crate) const EXTENSIONS: &[&str] = &["ofr", "ofs"];

#[repr(C)]
struct ReadInterface {
    close: unsafe extern "C" fn(*mut c_void) -> u8,
    read: unsafe extern "C" fn(*mut c_void, *mut c_void, u32) -> i32,
    eof: unsafe extern "C" fn(*mut c_void) -> u8,
    seekable: unsafe extern "C" fn(*mut c_void) -> u8,
    length: unsafe extern "C" fn(*mut c_void) -> i64,
    get_pos: unsafe extern "C" fn(*mut c_void) -> i64,
    seek: unsafe extern "C" fn(*mut c_void, i64) -> u8,
}

#[repr(C)]
struct OptimFrogInfo {
    channels: u32,
    sample_rate: u32,
    bits_per_sample: u32,
    bitrate: u32,
    version: u32,
    method: [c_char; 16],
    speedup: [c_char; 16],
    sample_type: [c_char; 16],
    chunk_lengths: [c_char; 16],
    no_points: i64,
    original_size: i64,
}

#[link(name = "OptimFROG")]
extern "C" {
    fn OptimFROG_createInstance() -> *mut c_void;
    fn OptimFROG_destroyInstance(instance: *mut c_void);
    fn OptimFROG_openExt(
        instance: *mut c_void,
        read_interface: *mut ReadInterface,
        data: *mut c_void,
        read_tags: u8,
    ) -> u8;
    fn OptimFROG_getInfo(instance: *mut c_void, info: *mut OptimFrogInfo) -> u8;
    fn OptimFROG_read(instance: *mut c_void, data: *mut c_void, points: u32) -> i32;
    fn OptimFROG_seekPoint(instance: *mut c_void, point: i64) -> u8;
}

unsafe fn stream_from(data: *mut c_void) -> &'static mut Box<dyn Stream> {
    &mut *data.cast::<Box<dyn Stream>>()
}

unsafe extern "C" fn cb_close(_data: *mut c_void) -> u8 {
    1
}

unsafe extern "C" fn cb_read(data: *mut c_void, dst: *mut c_void, count: u32) -> i32 {
    let dst = std::slice::from_raw_parts_mut(dst.cast::<u8>(), count as usize);
    match stream_from(data).try_read(dst) {
        Ok(n) => i32::try_from(n).unwrap_or(-1),
        Err(_) => -1,
    }
}

unsafe extern "C" fn cb_eof(data: *mut c_void) -> u8 {
    u8::from(stream_from(data).eof())
}

unsafe extern "C" fn cb_seekable(_data: *mut c_void) -> u8 {
    1
}

unsafe extern "C" fn cb_length(data: *mut c_void) -> i64 {
    stream_from(data)
        .size()
        .ok()
        .and_then(|size| i64::try_from(size).ok())
        .unwrap_or(-1)
}

unsafe extern "C" fn cb_get_pos(data: *mut c_void) -> i64 {
    stream_from(data)
        .tell()
        .ok()
        .and_then(|pos| i64::try_from(pos).ok())
        .unwrap_or(-1)
}

unsafe extern "C" fn cb_seek(data: *mut c_void, pos: i64) -> u8 {
    let Ok(pos) = u64::try_from(pos) else {
        return 0;
    };
    u8::from(stream_from(data).seek_to(pos).is_ok())
}

static mut CALLBACKS: ReadInterface = ReadInterface {
    close: cb_close,
    read: cb_read,
    eof: cb_eof,
    seekable: cb_seekable,
    length: cb_length,
    get_pos: cb_get_pos,
    seek: cb_seek,
};

/// Maps the SDK's sample-type string to container bytes and signedness.
fn parse_sample_type(text: &str) -> Result<(u32, bool)> {
    match text {
        "SINT8" => Ok((1, true)),
        "SINT16" => Ok((2, true)),
        "SINT24" => Ok((3, true)),
        "SINT32" => Ok((4, true)),
        "UINT8" => Ok((1, false)),
        "UINT16" => Ok((2, false)),
        "UINT24" => Ok((3, false)),
        "UINT32" => Ok((4, false)),
        other => Err(Error::unsupported_format(format!(
            "unsupported OptimFROG sample type: '{other}'"
        ))),
    }
}

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(OptimFrogDemuxer::open(stream, mode)?))
}

pub struct OptimFrogDemuxer {
    file: Box<Box<dyn Stream>>,
    instance: *mut c_void,
    info: OptimFrogInfo,
    blitter: Option<Blitter>,
    readbuf: Vec<u8>,
    bytes_per_frame: u32,
}

// The SDK instance and stream are owned exclusively by this demuxer.
unsafe impl Send for OptimFrogDemuxer {}

impl OptimFrogDemuxer {
    fn open(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let mut file: Box<Box<dyn Stream>> = Box::new(stream);

        // SAFETY: the stream lives behind a stable box owned by the
        // returned demuxer; the callback table is immutable.
        let instance = unsafe { OptimFROG_createInstance() };
        if instance.is_null() {
            return Err(Error::bad_alloc("failed to create OptimFROG instance"));
        }

        // SAFETY: instance checked non-null.
        unsafe {
            let data = std::ptr::from_mut::<Box<dyn Stream>>(file.as_mut()).cast();
            if OptimFROG_openExt(instance, std::ptr::addr_of_mut!(CALLBACKS), data, 0) == 0 {
                OptimFROG_destroyInstance(instance);
                return Err(Error::failure("failed to open OptimFROG decoder"));
            }
        }

        // SAFETY: instance is open; info is a plain output struct.
        let info = unsafe {
            let mut info = std::mem::zeroed::<OptimFrogInfo>();
            if OptimFROG_getInfo(instance, &mut info) == 0 {
                OptimFROG_destroyInstance(instance);
                return Err(Error::failure("failed to obtain OptimFROG file info"));
            }
            info
        };

        let bytes_per_frame = info.channels * (info.bits_per_sample / 8);
        let mut demuxer = Self {
            file,
            instance,
            info,
            blitter: None,
            readbuf: Vec::new(),
            bytes_per_frame,
        };

        if mode.contains(OpenMode::PLAYBACK) {
            // SAFETY: the strings are NUL-terminated fixed arrays.
            let sample_type = unsafe {
                CStr::from_ptr(demuxer.info.sample_type.as_ptr())
                    .to_string_lossy()
                    .into_owned()
            };
            let (bytes_per_sample, signed) = parse_sample_type(&sample_type)?;

            let mut flags = 0;
            if signed {
                flags |= pcm::SIGNED_INT;
            }
            demuxer.blitter = Some(Blitter::new(Spec {
                bits_per_sample: bytes_per_sample * 8,
                bytes_per_sample,
                channels: demuxer.info.channels,
                flags,
            })?);
            demuxer.readbuf =
                vec![0u8; (demuxer.info.sample_rate / 4) as usize * bytes_per_frame as usize];
        }
        Ok(demuxer)
    }
}

impl Drop for OptimFrogDemuxer {
    fn drop(&mut self) {
        // SAFETY: the instance was created by the matching constructor.
        unsafe { OptimFROG_destroyInstance(self.instance) };
    }
}

impl Input for OptimFrogDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        pkt.clear();
        pkt.set_channel_layout(guess_channel_layout(self.info.channels));
        let Some(blitter) = self.blitter.as_ref() else {
            return Ok(());
        };

        let frames = (self.readbuf.len() / self.bytes_per_frame as usize) as u32;
        // SAFETY: readbuf holds `frames` whole frames for the decoder.
        let got = unsafe {
            OptimFROG_read(
                self.instance,
                self.readbuf.as_mut_ptr().cast(),
                frames,
            )
        };

        if got <= 0 {
            if got == 0 {
                return Ok(());
            }
            return Err(Error::failure("failed to read OptimFROG packet"));
        }

        let bytes = got as usize * self.bytes_per_frame as usize;
        blitter.convert(&self.readbuf[..bytes], pkt);
        pkt.set_bit_rate(self.info.bitrate * 1000);
        Ok(())
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        // SAFETY: instance is valid.
        let ok = unsafe { OptimFROG_seekPoint(self.instance, i64::try_from(pts)?) };
        if ok == 0 {
            return Err(Error::seek_error("failed to seek in OptimFROG file"));
        }
        Ok(())
    }

    fn format(&self) -> Format {
        Format {
            channels: self.info.channels,
            channel_layout: guess_channel_layout(self.info.channels),
            sample_rate: self.info.sample_rate,
        }
    }

    fn info(&mut self, _chapter: u32) -> Result<StreamInfo> {
        let mut info = StreamInfo::new(self.format());
        info.codec_id = codec::OPTIMFROG;
        info.bits_per_sample = self.info.bits_per_sample;
        info.average_bit_rate = self.info.bitrate * 1000;
        info.frames = u64::try_from(self.info.no_points).unwrap_or(0);

        let file = self.file.as_mut().as_mut();
        if ape::find(file)?.is_some() {
            ape::read(file, &mut info.tags)?;
        } else if let Some(start) = id3v1::find(file)? {
            file.seek_to(start)?;
            id3v1::read(file, &mut info.tags)?;
        }
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        ape::find_image(self.file.as_mut().as_mut(), kind)
    }
}
