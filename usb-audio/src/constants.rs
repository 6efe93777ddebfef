/// Number of logical audio channels carried per direction.
pub const CHANNELS: usize = 4;

/// Number of 16-bit samples per audio block (one processing period per channel).
pub const AUDIO_BLOCK_SAMPLES: usize = 128;

/// Number of sample blocks in the global pool.
pub const POOL_SIZE: usize = 32;

/// Nominal audio sample rate in Hz.
pub const SAMPLE_RATE_HZ: u32 = 44_100;

/// Bytes occupied by one sample frame on the wire: 16 bits per channel,
/// packed two channels per 32-bit word.
pub const BYTES_PER_FRAME: usize = CHANNELS * 2;

/// Baseline frame count of one outgoing packet (1 ms of audio, rounded down).
pub const PACKET_FRAMES_BASE: usize = (SAMPLE_RATE_HZ / 1000) as usize;

/// Every this-many packets, one packet carries an extra frame so the
/// long-run average matches the fractional nominal rate (44.1 frames/ms).
pub const PACKET_EXTRA_INTERVAL: u32 = 10;

/// Largest isochronous data packet either direction must accommodate.
pub const MAX_PACKET_BYTES: usize = (PACKET_FRAMES_BASE + 1) * BYTES_PER_FRAME;

/// Rate feedback accumulator seed: nominal samples per USB frame in
/// 6.24 fixed point.
pub const FEEDBACK_NOMINAL: u32 = (((SAMPLE_RATE_HZ as u64) << 24) / 1000) as u32;

/// Accumulator right-shift for the 3-byte full-speed feedback format (10.14).
pub const FEEDBACK_SHIFT_FULL: u32 = 10;

/// Accumulator right-shift for the 4-byte high-speed feedback format (16.16).
pub const FEEDBACK_SHIFT_HIGH: u32 = 8;

/// Emergency accumulator step applied when a claim finds no data waiting.
/// Much larger than any steady-state correction (those are bounded by
/// `AUDIO_BLOCK_SAMPLES / 2`).
pub const FEEDBACK_UNDERRUN_STEP: i32 = 3500;

/// Buffer fill level the steady-state rate correction steers toward.
pub const TARGET_FILL: usize = AUDIO_BLOCK_SAMPLES / 2;

/// Volume control range exposed on the control surface (unsigned, linear).
pub const VOLUME_MIN: u16 = 0;
pub const VOLUME_MAX: u16 = 255;
pub const VOLUME_RES: u16 = 1;
