//! Software loopback simulation — the whole engine with no hardware.
//!
//! Plays the role of both the USB transport and the audio graph: a sine
//! generator pushes one channel set per audio period into the transmit
//! path, every staged packet is looped straight back into the receive
//! path, and the audio task claims periods as they complete. Prints the
//! stream counters and the feedback accumulator drift at the end.
//!
//! Run with: `cargo run -p usb-audio-demos --bin loopback_sim`

use usb_audio::block::ChannelSet;
use usb_audio::constants::{
    AUDIO_BLOCK_SAMPLES, BYTES_PER_FRAME, CHANNELS, SAMPLE_RATE_HZ,
};
use usb_audio::control::{FeatureUnit, MUTE_CONTROL, VOLUME_CONTROL};
use usb_audio::feedback::RateFeedback;
use usb_audio::io::{UsbAudioInput, UsbAudioOutput};
use usb_audio::transport::{EndpointKind, IsoTransfer, StreamDispatch, UsbSpeed};

/// Simulated stream length in USB frames (1 ms each).
const FRAMES: usize = 1000;

fn main() {
    let mut input = UsbAudioInput::new();
    let mut output = UsbAudioOutput::new();
    let feedback = RateFeedback::new();
    let features = FeatureUnit::new();
    let seed = feedback.raw();

    let (rx_packets, mut rx_blocks) = input.split();
    let (mut tx_blocks, tx_packets) = output.split();
    let mut dispatch = StreamDispatch::new(rx_packets, tx_packets, &feedback, UsbSpeed::Full);

    let mut rx_xfer = IsoTransfer::new(EndpointKind::Receive);
    let mut tx_xfer = IsoTransfer::new(EndpointKind::Transmit);
    let mut fb_xfer = IsoTransfer::new(EndpointKind::Feedback);
    dispatch
        .prime(&mut rx_xfer, &mut tx_xfer, &mut fb_xfer)
        .expect("descriptors freshly created");

    // Host pokes the control surface mid-stream.
    features
        .set_feature(VOLUME_CONTROL, 0, &200u16.to_le_bytes())
        .expect("volume in range");
    features
        .set_feature(MUTE_CONTROL, 0, &[0])
        .expect("valid mute payload");

    let mut phase = 0f32;
    let mut produced_periods = 0usize;
    let mut claimed_periods = 0usize;
    let mut received_frames = 0usize;

    for frame in 0..FRAMES {
        // "Bus": the transmit packet staged in the descriptor comes right
        // back as a receive completion.
        let staged = tx_xfer.staged().to_vec();
        tx_xfer.complete(staged.len()).expect("tx armed");
        dispatch.on_transmit_complete(&mut tx_xfer).expect("tx recycle");

        rx_xfer.buffer_mut()[..staged.len()].copy_from_slice(&staged);
        rx_xfer.complete(staged.len()).expect("rx armed");
        dispatch.on_receive_complete(&mut rx_xfer).expect("rx recycle");

        // Feedback endpoint polls every 8 frames at full speed.
        if frame % 8 == 7 {
            let len = fb_xfer.staged().len();
            fb_xfer.complete(len).expect("fb armed");
            dispatch.on_feedback_complete(&mut fb_xfer).expect("fb recycle");
        }

        // Audio task: one period every ~2.9 ms of bus traffic.
        received_frames += staged.len() / BYTES_PER_FRAME;
        while received_frames / AUDIO_BLOCK_SAMPLES > claimed_periods {
            if rx_blocks.claim_ready(&feedback).is_some() {
                claimed_periods += 1;
            } else {
                break;
            }
            if features.take_change() {
                println!(
                    "control change: mute={} volume={} scale={:.3}",
                    features.is_muted(),
                    features.volume(),
                    features.volume_scale()
                );
            }
            // Produce the next period: a 441 Hz tone on every channel.
            let mut set = ChannelSet::allocate().expect("pool sized for steady state");
            let step = 441.0 * core::f32::consts::TAU / SAMPLE_RATE_HZ as f32;
            for (ch, samples) in set.channels_mut().into_iter().enumerate() {
                for (i, s) in samples.iter_mut().enumerate() {
                    let x = (phase + i as f32 * step).sin();
                    *s = (x * 8000.0 * features.volume_scale()) as i16 + ch as i16;
                }
            }
            phase += AUDIO_BLOCK_SAMPLES as f32 * step;
            tx_blocks.push(set);
            produced_periods += 1;
        }
    }

    println!("simulated {FRAMES} USB frames ({CHANNELS} channels)");
    println!("periods produced: {produced_periods}, claimed: {claimed_periods}");
    println!(
        "tx overruns: {}, tx underruns: {}",
        tx_blocks.overruns(),
        tx_blocks.underruns()
    );
    println!(
        "rx overruns: {}, rx underruns: {}, rx discards: {}",
        rx_blocks.overruns(),
        rx_blocks.underruns(),
        rx_blocks.discards()
    );
    println!(
        "feedback accumulator drift: {} ({} → {})",
        feedback.raw() as i64 - seed as i64,
        seed,
        feedback.raw()
    );
}
