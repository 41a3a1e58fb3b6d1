//! Sending a test plan configuration to the device.
//!
//! The upload direction inverts the chunk protocol: the host sends a
//! FileData info frame, then the CSV body in ordered chunks, waiting
//! for an Ack after every frame. There is no retry; a missing or
//! negative acknowledgment aborts immediately.

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::{Chunk, Command, FileTransferInfo, Frame, MAX_CHUNK_SIZE};
use crate::session::SessionTimeouts;
use crate::session::link::FrameLink;
use crate::settings::TestConfig;
use log::{debug, info, trace};
use std::time::Duration;

/// Wait for the device to acknowledge the last sent frame.
fn expect_ack<P: Port>(link: &mut FrameLink<'_, P>, timeout: Duration) -> Result<()> {
    let frame = link.read_frame(timeout)?;
    if frame.command == Command::Ack {
        Ok(())
    } else {
        Err(Error::UnexpectedCommand {
            expected: Command::Ack,
            actual: frame.command,
        })
    }
}

/// Synthesize the CSV for `config` and send it as `setting_{plan}.csv`.
///
/// The caller is responsible for validating `config` first; nothing is
/// written to the wire for an invalid record.
#[allow(clippy::cast_possible_truncation)] // config bodies are tiny
pub(crate) fn send_config<P, F>(
    link: &mut FrameLink<'_, P>,
    timeouts: &SessionTimeouts,
    config: &TestConfig,
    progress: &mut F,
) -> Result<()>
where
    P: Port,
    F: FnMut(&str, usize, usize),
{
    let body = config.csv_body();
    let data = body.as_bytes();
    let filename = config.filename();

    info!("Sending file info: {} ({} bytes)", filename, data.len());
    let transfer_info = FileTransferInfo {
        file_index: config.plan_index,
        file_size: data.len() as u32,
        filename: filename.clone(),
    };
    link.write_frame(&Frame::new(Command::FileData, transfer_info.encode()))?;
    expect_ack(link, timeouts.info_ack)?;
    debug!("File info acknowledged");

    let total = data.len();
    let mut sent = 0;

    for (seq, piece) in data.chunks(MAX_CHUNK_SIZE).enumerate() {
        if crate::cancel_requested() {
            return Err(Error::Cancelled);
        }

        let chunk = Chunk {
            sequence: seq as u16,
            data: piece.to_vec(),
        };
        link.write_frame(&Frame::new(Command::FileData, chunk.encode()))?;
        expect_ack(link, timeouts.chunk_ack)?;

        sent += piece.len();
        trace!("Chunk {seq} acknowledged ({sent}/{total} bytes)");
        progress(&filename, sent, total);
    }

    info!("Configuration sent: {filename}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockPort;

    fn short_timeouts() -> SessionTimeouts {
        SessionTimeouts {
            handshake: Duration::from_millis(50),
            step: Duration::from_millis(50),
            info_ack: Duration::from_millis(50),
            chunk_ack: Duration::from_millis(50),
        }
    }

    fn plan_two() -> TestConfig {
        TestConfig {
            plan_index: 2,
            current_ma: 250,
            sample_rate_min: 1,
            duration_hours: 3,
            min_temp_c: -20,
            max_temp_c: 30,
        }
    }

    #[test]
    fn test_upload_sends_info_then_single_chunk() {
        let mut port = MockPort::new();
        port.feed_frame(&Frame::ack());
        port.feed_frame(&Frame::ack());

        let config = plan_two();
        let mut reports = Vec::new();
        {
            let mut link = FrameLink::new(&mut port).unwrap();
            send_config(&mut link, &short_timeouts(), &config, &mut |name, done, total| {
                reports.push((name.to_string(), done, total));
            })
            .unwrap();
        }

        let body = "current,sample rate,duration,min temp,max temp\n250,1,3,-20,30";
        let expected_info = FileTransferInfo {
            file_index: 2,
            file_size: body.len() as u32,
            filename: "setting_2.csv".to_string(),
        };
        let expected_chunk = Chunk {
            sequence: 0,
            data: body.as_bytes().to_vec(),
        };

        let mut expected = Frame::new(Command::FileData, expected_info.encode()).encode();
        let chunk_wire = Frame::new(Command::FileData, expected_chunk.encode()).encode();
        expected.extend_from_slice(&chunk_wire);
        assert_eq!(port.written, expected);
        assert_eq!(reports, vec![("setting_2.csv".to_string(), body.len(), body.len())]);
    }

    #[test]
    fn test_upload_fails_on_info_nack() {
        let mut port = MockPort::new();
        port.feed_frame(&Frame::nack());

        let config = plan_two();
        let mut link = FrameLink::new(&mut port).unwrap();
        let err =
            send_config(&mut link, &short_timeouts(), &config, &mut |_, _, _| {}).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedCommand {
                expected: Command::Ack,
                actual: Command::Nack,
            }
        ));
    }

    #[test]
    fn test_upload_fails_on_missing_chunk_ack() {
        let mut port = MockPort::new();
        // Info is acknowledged, then the device goes silent
        port.feed_frame(&Frame::ack());

        let config = plan_two();
        let mut link = FrameLink::new(&mut port).unwrap();
        let err =
            send_config(&mut link, &short_timeouts(), &config, &mut |_, _, _| {}).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
