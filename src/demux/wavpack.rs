//! WavPack demuxer (feature `wavpack`).
//!
//! Wraps libwavpack through its 64-bit stream-reader callback interface.
//! When the source is a local `file://` URI, the matching `.wvc`
//! correction file is opened alongside it for lossless hybrid playback.
//! Decoded samples arrive as 32-bit integers (or floats) and convert
//! through the PCM blitter.

use std::ffi::{c_char, c_int, c_void, CStr};

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::pcm::{self, Blitter, Spec};
use crate::audio::{codec, Format, Packet};
use crate::error::{Error, Result};
use crate::io::{self, Stream};
use crate::media::{ape, id3v1, tags, Image, ImageType};
use crate::uri::Uri;
use crate::util::align_up;

pub(crate) const EXTENSIONS: &[&str] = &["wv"];

const OPEN_WVC: c_int = 0x1;
const OPEN_DSD_AS_PCM: c_int = 0x200;

const MODE_WVC: c_int = 0x1;
const MODE_LOSSLESS: c_int = 0x2;
const MODE_FLOAT: c_int = 0x8;
const MODE_HIGH: c_int = 0x20;
const MODE_FAST: c_int = 0x40;
const MODE_EXTRA: c_int = 0x80;
const MODE_VERY_HIGH: c_int = 0x400;
const MODE_XMODE: c_int = 0x7000;

#[repr(C)]
struct WavpackStreamReader64 {
    read_bytes: unsafe extern "C" fn(*mut c_void, *mut c_void, i32) -> i32,
    write_bytes: unsafe extern "C" fn(*mut c_void, *mut c_void, i32) -> i32,
    get_pos: unsafe extern "C" fn(*mut c_void) -> i64,
    set_pos_abs: unsafe extern "C" fn(*mut c_void, i64) -> c_int,
    set_pos_rel: unsafe extern "C" fn(*mut c_void, i64, c_int) -> c_int,
    push_back_byte: unsafe extern "C" fn(*mut c_void, c_int) -> c_int,
    get_length: unsafe extern "C" fn(*mut c_void) -> i64,
    can_seek: unsafe extern "C" fn(*mut c_void) -> c_int,
    truncate_here: unsafe extern "C" fn(*mut c_void) -> c_int,
    close: unsafe extern "C" fn(*mut c_void) -> c_int,
}

#[allow(non_camel_case_types)]
type WavpackContext = c_void;

#[link(name = "wavpack")]
extern "C" {
    fn WavpackOpenFileInputEx64(
        reader: *mut WavpackStreamReader64,
        wv_id: *mut c_void,
        wvc_id: *mut c_void,
        error: *mut c_char,
        flags: c_int,
        norm_offset: c_int,
    ) -> *mut WavpackContext;
    fn WavpackCloseFile(ctx: *mut WavpackContext) -> *mut WavpackContext;
    fn WavpackGetSampleRate(ctx: *mut WavpackContext) -> u32;
    fn WavpackGetNumChannels(ctx: *mut WavpackContext) -> c_int;
    fn WavpackGetChannelMask(ctx: *mut WavpackContext) -> c_int;
    fn WavpackGetBitsPerSample(ctx: *mut WavpackContext) -> c_int;
    fn WavpackGetNumSamples64(ctx: *mut WavpackContext) -> i64;
    fn WavpackGetAverageBitrate(ctx: *mut WavpackContext, count_wvc: c_int) -> f64;
    fn WavpackGetInstantBitrate(ctx: *mut WavpackContext) -> f64;
    fn WavpackGetMode(ctx: *mut WavpackContext) -> c_int;
    fn WavpackUnpackSamples(ctx: *mut WavpackContext, buffer: *mut i32, samples: u32) -> u32;
    fn WavpackSeekSample64(ctx: *mut WavpackContext, sample: i64) -> c_int;
    fn WavpackGetNumErrors(ctx: *mut WavpackContext) -> c_int;
    fn WavpackGetErrorMessage(ctx: *mut WavpackContext) -> *mut c_char;
}

/// Opaque callback target: a boxed stream.
type CallbackStream = Box<dyn Stream>;

unsafe fn stream_from(id: *mut c_void) -> &'static mut CallbackStream {
    &mut *id.cast::<CallbackStream>()
}

unsafe extern "C" fn cb_read(id: *mut c_void, data: *mut c_void, count: i32) -> i32 {
    if count < 0 {
        return -1;
    }
    let dst = std::slice::from_raw_parts_mut(data.cast::<u8>(), count as usize);
    match stream_from(id).try_read(dst) {
        Ok(n) => i32::try_from(n).unwrap_or(-1),
        Err(_) => -1,
    }
}

unsafe extern "C" fn cb_write(_id: *mut c_void, _data: *mut c_void, _count: i32) -> i32 {
    -1
}

unsafe extern "C" fn cb_get_pos(id: *mut c_void) -> i64 {
    stream_from(id)
        .tell()
        .ok()
        .and_then(|pos| i64::try_from(pos).ok())
        .unwrap_or(-1)
}

unsafe extern "C" fn cb_set_pos_abs(id: *mut c_void, pos: i64) -> c_int {
    let Ok(pos) = u64::try_from(pos) else {
        return -1;
    };
    match stream_from(id).seek_to(pos) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

unsafe extern "C" fn cb_set_pos_rel(id: *mut c_void, delta: i64, mode: c_int) -> c_int {
    let from = match mode {
        0 => std::io::SeekFrom::Start(delta.max(0) as u64),
        1 => std::io::SeekFrom::Current(delta),
        _ => std::io::SeekFrom::End(delta),
    };
    match stream_from(id).seek(from) {
        Ok(_) => 0,
        Err(_) => -1,
    }
}

unsafe extern "C" fn cb_push_back_byte(id: *mut c_void, c: c_int) -> c_int {
    match stream_from(id).rewind_by(1) {
        Ok(()) => c,
        Err(_) => -1, // EOF
    }
}

unsafe extern "C" fn cb_get_length(id: *mut c_void) -> i64 {
    stream_from(id)
        .size()
        .ok()
        .and_then(|size| i64::try_from(size).ok())
        .unwrap_or(-1)
}

unsafe extern "C" fn cb_can_seek(_id: *mut c_void) -> c_int {
    1
}

unsafe extern "C" fn cb_truncate(_id: *mut c_void) -> c_int {
    -1
}

unsafe extern "C" fn cb_close(_id: *mut c_void) -> c_int {
    0
}

static mut READER: WavpackStreamReader64 = WavpackStreamReader64 {
    read_bytes: cb_read,
    write_bytes: cb_write,
    get_pos: cb_get_pos,
    set_pos_abs: cb_set_pos_abs,
    set_pos_rel: cb_set_pos_rel,
    push_back_byte: cb_push_back_byte,
    get_length: cb_get_length,
    can_seek: cb_can_seek,
    truncate_here: cb_truncate,
    close: cb_close,
};

fn open_correction_file(location: &Uri) -> Option<Box<CallbackStream>> {
    if location.scheme() != "file" {
        return None;
    }
    let mut path = location.to_file_path().ok()?;
    path.push('c');
    let uri = Uri::from_file_path(&path).ok()?;
    io::open(&uri, io::Mode::IN | io::Mode::BINARY)
        .ok()
        .map(Box::new)
}

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(WavpackDemuxer::open(stream, mode)?))
}

pub struct WavpackDemuxer {
    // Held behind stable addresses for the C callbacks.
    wv_file: Box<CallbackStream>,
    _wvc_file: Option<Box<CallbackStream>>,
    context: *mut WavpackContext,
    blitter: Option<Blitter>,
    readbuf: Vec<i32>,
    channels: u32,
    frames_per_packet: u32,
}

// The context and both streams are owned exclusively by this demuxer.
unsafe impl Send for WavpackDemuxer {}

impl WavpackDemuxer {
    fn open(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Self> {
        let location = stream.location();
        let mut wv_file: Box<CallbackStream> = Box::new(stream);
        let mut wvc_file = open_correction_file(&location);

        let mut error = [0 as c_char; 128];
        // SAFETY: the boxed streams outlive the context (both live in
        // the returned demuxer), and the reader table is immutable
        // after initialization.
        let context = unsafe {
            WavpackOpenFileInputEx64(
                std::ptr::addr_of_mut!(READER),
                std::ptr::from_mut::<CallbackStream>(wv_file.as_mut()).cast(),
                wvc_file
                    .as_mut()
                    .map_or(std::ptr::null_mut(), |file| {
                        std::ptr::from_mut::<CallbackStream>(file.as_mut()).cast()
                    }),
                error.as_mut_ptr(),
                OPEN_WVC | OPEN_DSD_AS_PCM,
                0,
            )
        };
        if context.is_null() {
            let message = unsafe { CStr::from_ptr(error.as_ptr()) };
            return Err(Error::failure(format!(
                "failed to open WavPack input file: {}",
                message.to_string_lossy()
            )));
        }

        // SAFETY: context checked non-null above.
        let (channels, sample_rate) = unsafe {
            (
                u32::try_from(WavpackGetNumChannels(context)).unwrap_or(0),
                WavpackGetSampleRate(context),
            )
        };
        let frames_per_packet = (sample_rate / 10).max(1);

        let mut demuxer = Self {
            wv_file,
            _wvc_file: wvc_file,
            context,
            blitter: None,
            readbuf: Vec::new(),
            channels,
            frames_per_packet,
        };

        if mode.contains(OpenMode::PLAYBACK) {
            // SAFETY: context is valid.
            let (wp_mode, bits) = unsafe {
                (
                    WavpackGetMode(context),
                    u32::try_from(WavpackGetBitsPerSample(context)).unwrap_or(16),
                )
            };

            let mut flags = 0;
            if wp_mode & MODE_FLOAT != 0 {
                flags |= pcm::IEEE_FLOAT;
            } else {
                flags |= pcm::SIGNED_INT;
            }

            demuxer.blitter = Some(Blitter::new(Spec {
                bits_per_sample: align_up(u64::from(bits), 8) as u32,
                bytes_per_sample: 4,
                channels,
                flags,
            })?);
            demuxer.readbuf = vec![0i32; frames_per_packet as usize * channels as usize];
        }
        Ok(demuxer)
    }
}

impl Drop for WavpackDemuxer {
    fn drop(&mut self) {
        // SAFETY: the context was opened by the matching constructor.
        unsafe {
            WavpackCloseFile(self.context);
        }
    }
}

impl Input for WavpackDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        pkt.clear();
        let Some(blitter) = self.blitter.as_ref() else {
            return Ok(());
        };

        // SAFETY: readbuf holds frames_per_packet × channels samples.
        let frames = unsafe {
            WavpackUnpackSamples(self.context, self.readbuf.as_mut_ptr(), self.frames_per_packet)
        };

        pkt.set_channel_layout_n(self.format().channel_layout, self.channels);
        if frames != 0 {
            let samples = frames as usize * self.channels as usize;
            if self.blitter.as_ref().expect("blitter present").spec().flags & pcm::IEEE_FLOAT != 0 {
                // Float data is stored bit-for-bit in the i32 buffer.
                let floats: Vec<f32> = self.readbuf[..samples]
                    .iter()
                    .map(|&bits| f32::from_bits(bits as u32))
                    .collect();
                pkt.assign(&floats);
            } else {
                blitter.convert_i32(&self.readbuf[..samples], pkt);
            }
        } else {
            // SAFETY: context is valid.
            let errors = unsafe { WavpackGetNumErrors(self.context) };
            if errors != 0 {
                let message = unsafe { CStr::from_ptr(WavpackGetErrorMessage(self.context)) };
                return Err(Error::failure(format!(
                    "WavPack read failed: {}",
                    message.to_string_lossy()
                )));
            }
        }

        // SAFETY: context is valid.
        let bit_rate = unsafe { WavpackGetInstantBitrate(self.context) };
        pkt.set_bit_rate(if bit_rate.is_finite() && bit_rate >= 0.0 {
            bit_rate as u32
        } else {
            0
        });
        Ok(())
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        // SAFETY: context is valid.
        let ok = unsafe { WavpackSeekSample64(self.context, i64::try_from(pts)?) };
        if ok == 0 {
            let message = unsafe { CStr::from_ptr(WavpackGetErrorMessage(self.context)) };
            return Err(Error::seek_error(format!(
                "WavPack seek failed: {}",
                message.to_string_lossy()
            )));
        }
        Ok(())
    }

    fn format(&self) -> Format {
        // SAFETY: context is valid.
        unsafe {
            Format {
                channels: self.channels,
                channel_layout: u32::try_from(WavpackGetChannelMask(self.context)).unwrap_or(0),
                sample_rate: WavpackGetSampleRate(self.context),
            }
        }
    }

    fn info(&mut self, _chapter: u32) -> Result<StreamInfo> {
        let mut info = StreamInfo::new(self.format());
        info.codec_id = codec::WAVPACK;

        // SAFETY: context is valid.
        unsafe {
            info.frames = u64::try_from(WavpackGetNumSamples64(self.context)).unwrap_or(0);
            info.bits_per_sample =
                u32::try_from(WavpackGetBitsPerSample(self.context)).unwrap_or(0);
            info.average_bit_rate = WavpackGetAverageBitrate(self.context, 1) as u32;

            let mode = WavpackGetMode(self.context);
            let encoding = if mode & MODE_WVC != 0 {
                "hybrid"
            } else if mode & MODE_LOSSLESS != 0 {
                "lossless"
            } else {
                "lossy"
            };
            let compression = if mode & MODE_VERY_HIGH != 0 {
                "very high"
            } else if mode & MODE_HIGH != 0 {
                "high"
            } else if mode & MODE_FAST != 0 {
                "fast"
            } else {
                "normal"
            };

            let profile = if mode & MODE_EXTRA != 0 {
                format!(
                    "{encoding}, {compression} compression (extra processing: {})",
                    (mode & MODE_XMODE) >> 12
                )
            } else {
                format!("{encoding}, {compression} compression")
            };
            info.props.insert(tags::CODEC_PROFILE, profile);
        }
        info.props.insert(tags::CONTAINER, "WavPack");

        let file = self.wv_file.as_mut().as_mut();
        if ape::find(file)?.is_some() {
            ape::read(file, &mut info.tags)?;
        } else if let Some(start) = id3v1::find(file)? {
            file.seek_to(start)?;
            id3v1::read(file, &mut info.tags)?;
        }
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        ape::find_image(self.wv_file.as_mut().as_mut(), kind)
    }
}
