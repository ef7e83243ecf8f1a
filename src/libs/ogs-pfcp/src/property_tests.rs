//! Property-Based Tests for the PFCP codec and transaction manager

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    use bytes::{Bytes, BytesMut};
    use proptest::prelude::*;

    use crate::header::{version_not_supported_response, PfcpHeader, PfcpMessageType};
    use crate::path::mock::MockSend;
    use crate::types::PFCP_MAX_SEQUENCE;
    use crate::xact::{XactConfig, XactManager};

    fn arb_header() -> impl Strategy<Value = PfcpHeader> {
        (
            0u8..8,
            any::<u8>(),
            any::<u16>(),
            proptest::option::of(any::<u64>()),
            0u32..=PFCP_MAX_SEQUENCE,
            proptest::option::of(0u8..16),
        )
            .prop_map(|(version, message_type, length, seid, sequence_number, priority)| {
                PfcpHeader {
                    version,
                    message_type,
                    length,
                    seid,
                    sequence_number,
                    priority,
                }
            })
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 4], 8805))
    }

    // ========================================================================
    // Header codec
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_header_round_trip(header in arb_header()) {
            let mut buf = BytesMut::new();
            header.encode(&mut buf);
            prop_assert_eq!(buf.len(), header.header_len());

            let mut bytes = buf.freeze();
            let decoded = PfcpHeader::decode(&mut bytes).unwrap();
            prop_assert_eq!(decoded, header);
            prop_assert!(bytes.is_empty());
        }

        #[test]
        fn prop_short_buffer_is_malformed(raw in prop::collection::vec(any::<u8>(), 0..8)) {
            let mut bytes = Bytes::from(raw);
            prop_assert!(PfcpHeader::decode(&mut bytes).is_err());
        }

        #[test]
        fn prop_version_not_supported_echoes_sequence(sqn in 0u32..=PFCP_MAX_SEQUENCE) {
            let rsp = version_not_supported_response(sqn);
            let decoded = PfcpHeader::decode(&mut Bytes::copy_from_slice(&rsp)).unwrap();
            prop_assert_eq!(decoded.msg_type(), Some(PfcpMessageType::VersionNotSupportedResponse));
            prop_assert_eq!(decoded.sequence_number, sqn);
            prop_assert_eq!(decoded.length, 4);
        }
    }

    // ========================================================================
    // Transaction manager
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Live local sequence numbers stay inside the namespace and are unique,
        /// whatever the order of creations and removals.
        #[test]
        fn prop_live_sequences_unique_and_bounded(
            max_sequence in 1u32..16,
            ops in prop::collection::vec(any::<(bool, u8)>(), 1..64),
        ) {
            let mut mgr: XactManager<()> = XactManager::new(XactConfig {
                max_sequence,
                max_per_node: 64,
                ..XactConfig::default()
            });
            let mut live = Vec::new();
            for (create, pick) in ops {
                if create || live.is_empty() {
                    if let Ok(id) = mgr.local_create(peer(), ()) {
                        live.push(id);
                    }
                } else {
                    let id = live.remove(pick as usize % live.len());
                    mgr.remove(id);
                }

                let mut seqs = mgr.local_sequences(&peer());
                prop_assert!(seqs.iter().all(|s| (1..=max_sequence).contains(s)));
                let total = seqs.len();
                seqs.sort_unstable();
                seqs.dedup();
                prop_assert_eq!(seqs.len(), total);
                prop_assert_eq!(total, live.len());
            }
        }

        /// A request either completes or times out, never both, and each
        /// outcome is delivered at most once.
        #[test]
        fn prop_completion_excludes_timeout(
            n3 in 1u32..5,
            respond_after in proptest::option::of(0u32..6),
        ) {
            let now = Instant::now();
            let t3 = Duration::from_millis(100);
            let tx = MockSend::default();
            let mut mgr: XactManager<u8> = XactManager::new(XactConfig {
                t3_response: t3,
                n3_response: n3,
                ..XactConfig::default()
            });
            let id = mgr.local_create(peer(), 1).unwrap();
            let req = PfcpHeader::new(PfcpMessageType::HeartbeatRequest, 0);
            mgr.update_tx(id, &req, &[]).unwrap();
            mgr.commit(id, &tx, now).unwrap();
            let sqn = mgr.get(id).unwrap().sequence_number;

            let mut completed = 0;
            let mut timed_out = 0;
            for tick in 0..8u32 {
                let at = now + t3 * tick;
                if respond_after == Some(tick) {
                    let rsp = PfcpHeader::new(PfcpMessageType::HeartbeatResponse, sqn);
                    if mgr.match_response(peer(), &rsp).is_ok() {
                        completed += 1;
                    }
                }
                for expired in mgr.expire(at) {
                    if mgr.on_timer(expired, &tx, at).is_some() {
                        timed_out += 1;
                    }
                }
            }

            prop_assert!(completed + timed_out == 1);
            prop_assert!(mgr.is_empty());
            prop_assert!(tx.count() as u32 <= n3);
            match respond_after {
                Some(tick) if tick <= n3 => prop_assert_eq!(completed, 1),
                _ => prop_assert_eq!(timed_out, 1),
            }
        }
    }
}
