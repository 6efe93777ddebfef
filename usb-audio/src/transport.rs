//! Transfer descriptors and endpoint lifecycle glue.
//!
//! The transport layer owns the endpoint hardware and its schedule; the
//! engine owns the data. They meet at a small set of recyclable
//! [`IsoTransfer`] descriptors — one per endpoint in the simplest
//! configuration — cycling through `Idle → Armed → Complete → Armed → …`:
//! the engine arms a descriptor with staged data (or an empty buffer for
//! receive), the transport completes it when the bus transaction finishes,
//! and the engine's completion handler consumes the result and re-arms.
//!
//! [`StreamDispatch`] is that completion handler: it binds the
//! callback-context halves of both stream paths to the descriptors and
//! refreshes the feedback value immediately before each feedback transfer
//! is re-armed. All three entry points run in bounded time.

use crate::constants::MAX_PACKET_BYTES;
use crate::feedback::RateFeedback;
use crate::io::input::InputProducer;
use crate::io::output::OutputConsumer;

/// Negotiated transport speed; selects the feedback wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbSpeed {
    /// Full speed: 1 ms frames, 3-byte feedback values.
    Full,
    /// High speed: 125 µs microframes, 4-byte feedback values.
    High,
}

/// The endpoint a transfer descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointKind {
    /// Host → device isochronous data.
    Receive,
    /// Device → host isochronous data.
    Transmit,
    /// Device → host rate feedback.
    Feedback,
}

/// Where a descriptor is in its recycle loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    /// Freshly created; not yet handed to the transport.
    Idle,
    /// Staged and waiting for the bus transaction.
    Armed,
    /// Transaction finished; payload (if any) is valid.
    Complete,
}

/// Descriptor misuse. These indicate a wiring bug between the transport
/// and the engine, not a runtime stream fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    WrongEndpoint,
    WrongState,
    Overflow,
}

/// One recyclable isochronous transfer.
///
/// Carries an inline bounded buffer so that arming and completing never
/// allocates. The transport writes received data into
/// [`buffer_mut()`](Self::buffer_mut) while the descriptor is armed, then
/// calls [`complete()`](Self::complete); for outgoing endpoints it reads
/// [`staged()`](Self::staged) instead.
pub struct IsoTransfer {
    kind: EndpointKind,
    state: TransferState,
    len: usize,
    buffer: [u8; MAX_PACKET_BYTES],
}

impl IsoTransfer {
    /// Create an idle descriptor for one endpoint.
    pub const fn new(kind: EndpointKind) -> Self {
        IsoTransfer {
            kind,
            state: TransferState::Idle,
            len: 0,
            buffer: [0u8; MAX_PACKET_BYTES],
        }
    }

    /// The endpoint this descriptor serves.
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Engine side: stage `len` bytes of the buffer and hand the
    /// descriptor to the transport. `len` is 0 for receive transfers.
    pub fn arm(&mut self, len: usize) -> Result<(), TransportError> {
        if self.state == TransferState::Armed {
            return Err(TransportError::WrongState);
        }
        if len > MAX_PACKET_BYTES {
            return Err(TransportError::Overflow);
        }
        self.len = len;
        self.state = TransferState::Armed;
        Ok(())
    }

    /// Transport side: finish an armed transfer. For receive endpoints
    /// `len` is the number of bytes the host delivered (zero-length
    /// packets are legal); for outgoing endpoints it echoes the staged
    /// length.
    pub fn complete(&mut self, len: usize) -> Result<(), TransportError> {
        if self.state != TransferState::Armed {
            return Err(TransportError::WrongState);
        }
        if len > MAX_PACKET_BYTES {
            return Err(TransportError::Overflow);
        }
        self.len = len;
        self.state = TransferState::Complete;
        Ok(())
    }

    /// The transfer's payload: received data after a receive completion,
    /// staged data on an armed outgoing descriptor.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Staged bytes for the transport to put on the bus.
    pub fn staged(&self) -> &[u8] {
        self.payload()
    }

    /// The full backing buffer, for the side currently filling it.
    pub fn buffer_mut(&mut self) -> &mut [u8; MAX_PACKET_BYTES] {
        &mut self.buffer
    }
}

/// Completion-side wiring of one bidirectional stream.
///
/// Owns the callback halves of the receive and transmit paths and services
/// the three endpoint completions. The ordinary-context halves
/// (`InputConsumer`, `OutputProducer`) stay with the audio task.
pub struct StreamDispatch<'a> {
    rx: InputProducer<'a>,
    tx: OutputConsumer<'a>,
    feedback: &'a RateFeedback,
    speed: UsbSpeed,
}

impl<'a> StreamDispatch<'a> {
    /// Bind the callback halves to their endpoints.
    pub fn new(
        rx: InputProducer<'a>,
        tx: OutputConsumer<'a>,
        feedback: &'a RateFeedback,
        speed: UsbSpeed,
    ) -> Self {
        StreamDispatch {
            rx,
            tx,
            feedback,
            speed,
        }
    }

    /// Arm all three descriptors before streaming starts. The receive
    /// descriptor is armed empty and bootstraps on its first (possibly
    /// zero-length) completion; the outgoing descriptors are staged with
    /// their first payloads.
    pub fn prime(
        &mut self,
        rx: &mut IsoTransfer,
        tx: &mut IsoTransfer,
        feedback: &mut IsoTransfer,
    ) -> Result<(), TransportError> {
        ensure_kind(rx, EndpointKind::Receive)?;
        ensure_kind(tx, EndpointKind::Transmit)?;
        ensure_kind(feedback, EndpointKind::Feedback)?;

        rx.arm(0)?;
        let staged = self.tx.fill_packet(tx.buffer_mut());
        tx.arm(staged)?;
        self.stage_feedback(feedback)
    }

    /// A receive transfer finished: feed its payload to the receive path
    /// and re-arm the descriptor.
    pub fn on_receive_complete(&mut self, xfer: &mut IsoTransfer) -> Result<(), TransportError> {
        ensure_kind(xfer, EndpointKind::Receive)?;
        ensure_complete(xfer)?;
        self.rx.on_packet(xfer.payload());
        xfer.arm(0)
    }

    /// A transmit transfer finished: stage the next packet and re-arm.
    pub fn on_transmit_complete(&mut self, xfer: &mut IsoTransfer) -> Result<(), TransportError> {
        ensure_kind(xfer, EndpointKind::Transmit)?;
        ensure_complete(xfer)?;
        let staged = self.tx.fill_packet(xfer.buffer_mut());
        xfer.arm(staged)
    }

    /// A feedback transfer finished: snapshot the accumulator and re-arm.
    /// The snapshot happens here, immediately before arming, so the host
    /// sees the freshest rate estimate.
    pub fn on_feedback_complete(&mut self, xfer: &mut IsoTransfer) -> Result<(), TransportError> {
        ensure_kind(xfer, EndpointKind::Feedback)?;
        ensure_complete(xfer)?;
        self.stage_feedback(xfer)
    }

    fn stage_feedback(&mut self, xfer: &mut IsoTransfer) -> Result<(), TransportError> {
        let value = self.feedback.snapshot(self.speed);
        let bytes = value.as_bytes();
        xfer.buffer_mut()[..bytes.len()].copy_from_slice(bytes);
        xfer.arm(bytes.len())
    }
}

fn ensure_kind(xfer: &IsoTransfer, kind: EndpointKind) -> Result<(), TransportError> {
    if xfer.kind() != kind {
        return Err(TransportError::WrongEndpoint);
    }
    Ok(())
}

fn ensure_complete(xfer: &IsoTransfer) -> Result<(), TransportError> {
    if xfer.state() != TransferState::Complete {
        return Err(TransportError::WrongState);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::pool::{test_guard, POOL};
    use crate::constants::{BYTES_PER_FRAME, PACKET_FRAMES_BASE};
    use crate::io::input::UsbAudioInput;
    use crate::io::output::UsbAudioOutput;

    #[test]
    fn descriptor_lifecycle() {
        let mut xfer = IsoTransfer::new(EndpointKind::Receive);
        assert_eq!(xfer.state(), TransferState::Idle);

        xfer.arm(0).unwrap();
        assert_eq!(xfer.state(), TransferState::Armed);
        // Double-arm is a wiring bug.
        assert_eq!(xfer.arm(0), Err(TransportError::WrongState));

        xfer.buffer_mut()[0] = 0xAA;
        xfer.complete(1).unwrap();
        assert_eq!(xfer.state(), TransferState::Complete);
        assert_eq!(xfer.payload(), &[0xAA]);

        // Completing twice is too.
        assert_eq!(xfer.complete(1), Err(TransportError::WrongState));

        // Recycle.
        xfer.arm(0).unwrap();
        assert_eq!(xfer.state(), TransferState::Armed);
    }

    #[test]
    fn oversized_lengths_are_rejected() {
        let mut xfer = IsoTransfer::new(EndpointKind::Transmit);
        assert_eq!(
            xfer.arm(MAX_PACKET_BYTES + 1),
            Err(TransportError::Overflow)
        );
        xfer.arm(0).unwrap();
        assert_eq!(
            xfer.complete(MAX_PACKET_BYTES + 1),
            Err(TransportError::Overflow)
        );
    }

    #[test]
    fn dispatch_services_all_three_endpoints() {
        let _guard = test_guard();
        POOL.reset();
        let mut input = UsbAudioInput::new();
        let mut output = UsbAudioOutput::new();
        let feedback = RateFeedback::new();
        let (rx_producer, _rx_consumer) = input.split();
        let (_tx_producer, tx_consumer) = output.split();
        let mut dispatch =
            StreamDispatch::new(rx_producer, tx_consumer, &feedback, UsbSpeed::Full);

        let mut rx = IsoTransfer::new(EndpointKind::Receive);
        let mut tx = IsoTransfer::new(EndpointKind::Transmit);
        let mut fb = IsoTransfer::new(EndpointKind::Feedback);
        dispatch.prime(&mut rx, &mut tx, &mut fb).unwrap();

        assert_eq!(rx.state(), TransferState::Armed);
        assert_eq!(tx.staged().len(), PACKET_FRAMES_BASE * BYTES_PER_FRAME);
        assert_eq!(fb.staged().len(), 3);
        assert_eq!(fb.staged(), feedback.snapshot(UsbSpeed::Full).as_bytes());

        // Bus turnaround on every endpoint.
        rx.complete(0).unwrap();
        dispatch.on_receive_complete(&mut rx).unwrap();
        assert_eq!(rx.state(), TransferState::Armed);

        let sent = tx.staged().len();
        tx.complete(sent).unwrap();
        dispatch.on_transmit_complete(&mut tx).unwrap();
        assert_eq!(tx.state(), TransferState::Armed);

        let sent = fb.staged().len();
        fb.complete(sent).unwrap();
        dispatch.on_feedback_complete(&mut fb).unwrap();
        assert_eq!(fb.state(), TransferState::Armed);
    }

    #[test]
    fn dispatch_rejects_mismatched_descriptors() {
        let _guard = test_guard();
        POOL.reset();
        let mut input = UsbAudioInput::new();
        let mut output = UsbAudioOutput::new();
        let feedback = RateFeedback::new();
        let (rx_producer, _rx_consumer) = input.split();
        let (_tx_producer, tx_consumer) = output.split();
        let mut dispatch =
            StreamDispatch::new(rx_producer, tx_consumer, &feedback, UsbSpeed::High);

        let mut tx = IsoTransfer::new(EndpointKind::Transmit);
        assert_eq!(
            dispatch.on_receive_complete(&mut tx),
            Err(TransportError::WrongEndpoint)
        );

        // Right endpoint, wrong state.
        let mut rx = IsoTransfer::new(EndpointKind::Receive);
        assert_eq!(
            dispatch.on_receive_complete(&mut rx),
            Err(TransportError::WrongState)
        );
    }

    #[test]
    fn high_speed_feedback_is_4_bytes() {
        let _guard = test_guard();
        POOL.reset();
        let mut input = UsbAudioInput::new();
        let mut output = UsbAudioOutput::new();
        let feedback = RateFeedback::new();
        let (rx_producer, _rx_consumer) = input.split();
        let (_tx_producer, tx_consumer) = output.split();
        let mut dispatch =
            StreamDispatch::new(rx_producer, tx_consumer, &feedback, UsbSpeed::High);

        let mut fb = IsoTransfer::new(EndpointKind::Feedback);
        fb.arm(0).unwrap();
        fb.complete(0).unwrap();
        dispatch.on_feedback_complete(&mut fb).unwrap();
        assert_eq!(fb.staged().len(), 4);
    }
}
