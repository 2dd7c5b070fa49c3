//! Musepack demuxer (feature `musepack`).
//!
//! Wraps libmpcdec's demuxer/decoder through its reader callbacks.
//! Handles SV7 and SV8 streams, SV8 chapters (with embedded header-less
//! APE chapter tags), and the Musepack fixed-point ReplayGain fields.

use std::ffi::{c_char, c_int, c_void, CStr};

use crate::audio::input::{Input, OpenMode, StreamInfo};
use crate::audio::{codec, guess_channel_layout, Format, Packet};
use crate::error::{Error, Result};
use crate::io::Stream;
use crate::media::{ape, id3v1, tags, Dictionary, Image, ImageType};
use crate::util::muldiv;

pub(crate) const EXTENSIONS: &[&str] = &["mp+", "mpc", "mpp"];

/// `MPC_FRAME_LENGTH (36 × 32) × MPC_MAX_CHANNELS (2)`.
const DECODER_BUFFER_LENGTH: usize = 36 * 32 * 2;

#[repr(C)]
struct MpcReader {
    read: unsafe extern "C" fn(*mut MpcReader, *mut c_void, i32) -> i32,
    seek: unsafe extern "C" fn(*mut MpcReader, i32) -> u8,
    tell: unsafe extern "C" fn(*mut MpcReader) -> i32,
    get_size: unsafe extern "C" fn(*mut MpcReader) -> i32,
    canseek: unsafe extern "C" fn(*mut MpcReader) -> u8,
    data: *mut c_void,
}

#[repr(C)]
struct MpcStreamInfo {
    sample_freq: u32,
    channels: u32,
    stream_version: u32,
    bitrate: u32,
    average_bitrate: f64,
    max_band: u32,
    ms: u32,
    fast_seek: u32,
    block_pwr: u32,

    header_position: u32,
    is_true_gapless: u32,
    samples: u64,
    beg_silence: u64,

    encoder_version: u32,
    encoder: [c_char; 256],
    pns: u8,
    profile: f32,
    profile_name: *const c_char,

    gain_title: i16,
    gain_album: i16,
    peak_album: u16,
    peak_title: u16,

    bitrate_flag: u32,
    mean_bitrate: f64,
    frames_count: u32,
    tag_offset: i64,
    total_file_length: i64,
}

#[repr(C)]
struct MpcFrameInfo {
    samples: u32,
    bits: i32,
    buffer: *mut f32,
    is_key_frame: u8,
}

#[repr(C)]
struct MpcChapInfo {
    sample: u64,
    gain: u16,
    peak: u16,
    tag_size: u32,
    tag: *mut c_char,
}

#[allow(non_camel_case_types)]
type MpcDemux = c_void;

#[link(name = "mpcdec")]
extern "C" {
    fn mpc_demux_init(reader: *mut MpcReader) -> *mut MpcDemux;
    fn mpc_demux_exit(demux: *mut MpcDemux);
    fn mpc_demux_get_info(demux: *mut MpcDemux, info: *mut MpcStreamInfo);
    fn mpc_demux_decode(demux: *mut MpcDemux, frame: *mut MpcFrameInfo) -> c_int;
    fn mpc_demux_seek_sample(demux: *mut MpcDemux, sample: u64) -> c_int;
    fn mpc_demux_chap_nb(demux: *mut MpcDemux) -> c_int;
    fn mpc_demux_chap(demux: *mut MpcDemux, chapter: c_int) -> *const MpcChapInfo;
}

unsafe extern "C" fn cb_read(reader: *mut MpcReader, dst: *mut c_void, count: i32) -> i32 {
    if count < 0 {
        return -1;
    }
    let stream = &mut *(*reader).data.cast::<Box<dyn Stream>>();
    let dst = std::slice::from_raw_parts_mut(dst.cast::<u8>(), count as usize);
    match stream.try_read(dst) {
        Ok(n) => i32::try_from(n).unwrap_or(-1),
        Err(_) => -1,
    }
}

unsafe extern "C" fn cb_seek(reader: *mut MpcReader, pos: i32) -> u8 {
    let stream = &mut *(*reader).data.cast::<Box<dyn Stream>>();
    let Ok(pos) = u64::try_from(pos) else {
        return 0;
    };
    u8::from(stream.seek_to(pos).is_ok())
}

unsafe extern "C" fn cb_tell(reader: *mut MpcReader) -> i32 {
    let stream = &mut *(*reader).data.cast::<Box<dyn Stream>>();
    stream
        .tell()
        .ok()
        .and_then(|pos| i32::try_from(pos).ok())
        .unwrap_or(-1)
}

unsafe extern "C" fn cb_get_size(reader: *mut MpcReader) -> i32 {
    let stream = &mut *(*reader).data.cast::<Box<dyn Stream>>();
    stream
        .size()
        .ok()
        .and_then(|size| i32::try_from(size).ok())
        .unwrap_or(-1)
}

unsafe extern "C" fn cb_canseek(_reader: *mut MpcReader) -> u8 {
    1
}

pub(crate) fn create(stream: Box<dyn Stream>, mode: OpenMode) -> Result<Box<dyn Input>> {
    Ok(Box::new(MusepackDemuxer::open(stream, mode)?))
}

pub struct MusepackDemuxer {
    file: Box<Box<dyn Stream>>,
    reader: Box<MpcReader>,
    demux: *mut MpcDemux,
    info: MpcStreamInfo,
}

// The demux handle and stream are owned exclusively by this demuxer.
unsafe impl Send for MusepackDemuxer {}

impl MusepackDemuxer {
    fn open(stream: Box<dyn Stream>, _mode: OpenMode) -> Result<Self> {
        let mut file: Box<Box<dyn Stream>> = Box::new(stream);
        let mut reader = Box::new(MpcReader {
            read: cb_read,
            seek: cb_seek,
            tell: cb_tell,
            get_size: cb_get_size,
            canseek: cb_canseek,
            data: std::ptr::from_mut::<Box<dyn Stream>>(file.as_mut()).cast(),
        });

        // SAFETY: the reader table and stream live behind stable boxes
        // owned by the returned demuxer.
        let demux = unsafe { mpc_demux_init(reader.as_mut()) };
        if demux.is_null() {
            return Err(Error::invalid_data_format("not a Musepack stream"));
        }

        // SAFETY: demux checked non-null; info is a plain output struct.
        let info = unsafe {
            let mut info = std::mem::zeroed::<MpcStreamInfo>();
            mpc_demux_get_info(demux, &mut info);
            info
        };

        if info.beg_silence >= info.samples {
            // SAFETY: demux was initialized above.
            unsafe { mpc_demux_exit(demux) };
            return Err(Error::out_of_bounds(format!(
                "Musepack: beginning silence ({}) cannot equal or exceed the total samples ({})",
                info.beg_silence, info.samples
            )));
        }

        Ok(Self {
            file,
            reader,
            demux,
            info,
        })
    }

    fn insert_gain(dict: &mut Dictionary, key: &str, value: u16) {
        if value != 0 {
            let gain = 64.82 - f64::from(value) / 256.0;
            dict.insert_or_assign(key, format!("{gain:.2} dB"));
        }
    }

    fn insert_peak(dict: &mut Dictionary, key: &str, value: u16) {
        if value != 0 {
            // The peak field is 256·20·log10 of the linear peak.
            let peak = 10f64.powf(f64::from(value) / 256.0 / 20.0) / f64::from(1 << 15);
            dict.insert_or_assign(key, format!("{peak:.6}"));
        }
    }
}

impl Drop for MusepackDemuxer {
    fn drop(&mut self) {
        // SAFETY: the handle was created by the matching constructor.
        unsafe { mpc_demux_exit(self.demux) };
        let _ = &self.reader;
    }
}

impl Input for MusepackDemuxer {
    fn read(&mut self, pkt: &mut Packet) -> Result<()> {
        pkt.clear();
        pkt.set_channel_layout(guess_channel_layout(self.info.channels));
        pkt.resize(DECODER_BUFFER_LENGTH);

        let mut frame = MpcFrameInfo {
            samples: 0,
            bits: 0,
            buffer: pkt.samples_mut().as_mut_ptr(),
            is_key_frame: 0,
        };

        loop {
            // SAFETY: the frame buffer holds DECODER_BUFFER_LENGTH
            // floats for the decoder to fill.
            let status = unsafe { mpc_demux_decode(self.demux, &mut frame) };
            if status != 0 {
                return Err(Error::failure(format!(
                    "failed to decode Musepack frame (code={status:#010x})"
                )));
            }
            if frame.bits <= 0 {
                pkt.clear();
                return Ok(());
            }
            if frame.samples != 0 {
                break;
            }
        }

        let bits = u64::from(frame.bits.unsigned_abs());
        pkt.set_bit_rate(muldiv(bits, u64::from(self.info.sample_freq), u64::from(frame.samples))
            as u32);
        pkt.resize(frame.samples as usize * self.info.channels as usize);
        Ok(())
    }

    fn seek(&mut self, pts: u64) -> Result<()> {
        // SAFETY: demux is valid.
        let status = unsafe { mpc_demux_seek_sample(self.demux, pts) };
        if status != 0 {
            return Err(Error::seek_error(format!(
                "failed to seek in Musepack stream (code={status:#010x})"
            )));
        }
        Ok(())
    }

    fn format(&self) -> Format {
        Format {
            channels: self.info.channels,
            channel_layout: guess_channel_layout(self.info.channels),
            sample_rate: self.info.sample_freq,
        }
    }

    fn info(&mut self, chapter: u32) -> Result<StreamInfo> {
        let mut info = StreamInfo::new(self.format());
        info.average_bit_rate = self.info.average_bitrate as u32;
        info.codec_id = if self.info.stream_version == 8 {
            codec::MUSEPACK_SV8
        } else {
            codec::MUSEPACK_SV7
        };

        // SAFETY: the strings point into the long-lived stream info.
        unsafe {
            if !self.info.profile_name.is_null() {
                info.props.insert(
                    tags::CODEC_PROFILE,
                    CStr::from_ptr(self.info.profile_name)
                        .to_string_lossy()
                        .into_owned(),
                );
            }
            let encoder = CStr::from_ptr(self.info.encoder.as_ptr());
            if !encoder.to_bytes().is_empty() {
                info.props
                    .insert(tags::ENCODER, encoder.to_string_lossy().into_owned());
            }
        }

        let file = self.file.as_mut().as_mut();
        if ape::find(file)?.is_some() {
            ape::read(file, &mut info.tags)?;
        } else if let Some(start) = id3v1::find(file)? {
            file.seek_to(start)?;
            id3v1::read(file, &mut info.tags)?;
        }

        Self::insert_gain(&mut info.tags, tags::RG_ALBUM_GAIN, self.info.gain_album as u16);
        Self::insert_peak(&mut info.tags, tags::RG_ALBUM_PEAK, self.info.peak_album);

        if chapter == 0 {
            info.frames = self.info.samples - self.info.beg_silence;
            Self::insert_gain(&mut info.tags, tags::RG_TRACK_GAIN, self.info.gain_title as u16);
            Self::insert_peak(&mut info.tags, tags::RG_TRACK_PEAK, self.info.peak_title);
        } else {
            let index = c_int::try_from(chapter - 1)?;
            // SAFETY: demux is valid; chapter pointers live as long as
            // the demux handle.
            unsafe {
                let chap = mpc_demux_chap(self.demux, index);
                if chap.is_null() {
                    return Err(Error::invalid_argument(format!(
                        "no such Musepack chapter: {chapter}"
                    )));
                }

                let next = mpc_demux_chap(self.demux, index + 1);
                info.frames = if next.is_null() {
                    self.info.samples - self.info.beg_silence
                } else {
                    (*next).sample
                };
                info.frames -= (*chap).sample;
                info.start_offset = (*chap).sample;

                if (*chap).tag_size != 0 {
                    let tag = std::slice::from_raw_parts(
                        (*chap).tag.cast::<u8>(),
                        (*chap).tag_size as usize,
                    );
                    let mut chapter_tags = Dictionary::new();
                    ape::read_no_preamble(tag, &mut chapter_tags)?;
                    info.tags.merge(&chapter_tags);
                }
                Self::insert_gain(&mut info.tags, tags::RG_TRACK_GAIN, (*chap).gain);
                Self::insert_peak(&mut info.tags, tags::RG_TRACK_PEAK, (*chap).peak);
            }
        }
        Ok(info)
    }

    fn image(&mut self, kind: ImageType) -> Result<Option<Image>> {
        ape::find_image(self.file.as_mut().as_mut(), kind)
    }

    fn chapter_count(&self) -> u32 {
        // SAFETY: demux is valid.
        let count = unsafe { mpc_demux_chap_nb(self.demux) };
        u32::try_from(count).unwrap_or(0)
    }
}
