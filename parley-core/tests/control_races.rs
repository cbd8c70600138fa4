use std::collections::VecDeque;

use parley_core::{
    AgcSettings, CaptureProcessor, ControlInbox, ControlMessage, NoControl, ProcessorConfig,
    ProcessorMessage, SourceRate,
};

const CHUNK: usize = 1_024;

fn processor() -> CaptureProcessor {
    CaptureProcessor::new(ProcessorConfig {
        chunk_size: CHUNK,
        source_rate: SourceRate::Reported(16_000),
        agc: AgcSettings {
            enabled: false,
            ..AgcSettings::default()
        },
        ..ProcessorConfig::default()
    })
    .expect("valid config")
}

fn audio_count(messages: &[ProcessorMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ProcessorMessage::Audio(_)))
        .count()
}

/// Delivers each message at a chosen control check.
///
/// The processor drains its inbox until it sees `None`, so every drain ends
/// with exactly one empty poll. Counting those gives the index of the check
/// currently in progress: 0 at block start, then two per chunk (before it is
/// built, before it is emitted).
struct ScriptedInbox {
    script: VecDeque<(usize, ControlMessage)>,
    check: usize,
}

impl ScriptedInbox {
    fn new(script: impl IntoIterator<Item = (usize, ControlMessage)>) -> Self {
        Self {
            script: script.into_iter().collect(),
            check: 0,
        }
    }
}

impl ControlInbox for ScriptedInbox {
    fn poll(&mut self) -> Option<ControlMessage> {
        match self.script.front() {
            Some((at, _)) if *at == self.check => self.script.pop_front().map(|(_, m)| m),
            _ => {
                self.check += 1;
                None
            }
        }
    }
}

#[test]
fn stop_in_same_tick_as_full_chunk_emits_nothing() {
    let mut p = processor();
    let mut inbox: VecDeque<_> = [ControlMessage::Stop].into();

    let out = p.process_block(&mut inbox, &vec![0.2; CHUNK]);
    assert_eq!(audio_count(&out), 0);
    assert_eq!(p.buffered_len(), 0);
    assert!(!p.is_active());
}

#[test]
fn stop_before_any_audio_keeps_accumulator_empty() {
    let mut p = processor();
    let mut inbox = ScriptedInbox::new([(0, ControlMessage::Stop)]);

    assert!(p.process_block(&mut inbox, &vec![0.2; CHUNK / 4]).is_empty());
    assert_eq!(p.buffered_len(), 0);
    assert_eq!(p.chunk_count(), 0);
}

#[test]
fn stop_mid_accumulation_discards_partial_chunk() {
    let mut p = processor();
    p.process_block(&mut NoControl, &vec![0.2; CHUNK - 24]);
    assert_eq!(p.buffered_len(), CHUNK - 24);

    let mut inbox: VecDeque<_> = [ControlMessage::Stop, ControlMessage::Start].into();
    let out = p.process_block(&mut inbox, &vec![0.2; 100]);
    assert_eq!(audio_count(&out), 0, "old samples must not complete a chunk");
    assert_eq!(p.buffered_len(), 100);

    let out = p.process_block(&mut NoControl, &vec![0.2; CHUNK - 100]);
    assert_eq!(audio_count(&out), 1);
    assert_eq!(p.buffered_len(), 0);
}

#[test]
fn stop_before_chunk_is_built_drops_it() {
    let mut p = processor();
    let mut inbox = ScriptedInbox::new([(1, ControlMessage::Stop)]);

    let out = p.process_block(&mut inbox, &vec![0.2; CHUNK]);
    assert_eq!(audio_count(&out), 0);
    assert_eq!(p.buffered_len(), 0);
    assert!(!p.is_active());
}

#[test]
fn stop_between_build_and_emit_drops_it() {
    let mut p = processor();
    let mut inbox = ScriptedInbox::new([(2, ControlMessage::Stop)]);

    let out = p.process_block(&mut inbox, &vec![0.2; CHUNK]);
    assert_eq!(audio_count(&out), 0);
    assert_eq!(p.buffered_len(), 0);
}

#[test]
fn stop_and_start_between_build_and_emit_still_drops_it() {
    let mut p = processor();
    let mut inbox = ScriptedInbox::new([(2, ControlMessage::Stop), (2, ControlMessage::Start)]);

    let out = p.process_block(&mut inbox, &vec![0.2; CHUNK]);
    assert_eq!(audio_count(&out), 0);
    assert_eq!(p.buffered_len(), 0);
    assert!(p.is_active());
}

#[test]
fn stop_while_draining_withdraws_earlier_chunks_from_same_block() {
    let mut p = processor();
    // check 3 is the pre-build check of the second chunk.
    let mut inbox = ScriptedInbox::new([(3, ControlMessage::Stop)]);

    let out = p.process_block(&mut inbox, &vec![0.2; CHUNK * 3]);
    assert_eq!(audio_count(&out), 0);
    assert_eq!(p.buffered_len(), 0);
}

#[test]
fn config_mid_drain_does_not_interrupt_emission() {
    let mut p = processor();
    let mut inbox = ScriptedInbox::new([(
        2,
        ControlMessage::Config {
            enable_agc: Some(true),
            target_rms: Some(0.2),
        },
    )]);

    let out = p.process_block(&mut inbox, &vec![0.2; CHUNK * 2]);
    assert_eq!(audio_count(&out), 2);
    assert!(p.agc_settings().enabled);
}

/// Deterministic generator for the randomized sequence test.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }
}

#[test]
fn random_control_sequences_never_leak_audio_while_stopped() {
    for seed in 0..20u64 {
        let mut rng = Lcg(seed);
        let mut p = processor();
        let mut pending: VecDeque<ControlMessage> = VecDeque::new();

        // Model: whether capture is on, and how many samples since the last stop.
        let mut active = true;
        let mut buffered = 0usize;

        for _ in 0..300 {
            match rng.next() % 10 {
                0 => pending.push_back(ControlMessage::Stop),
                1 => pending.push_back(ControlMessage::Start),
                2 => pending.push_back(ControlMessage::Config {
                    enable_agc: Some(rng.next() % 2 == 0),
                    target_rms: None,
                }),
                _ => {
                    for msg in &pending {
                        match msg {
                            ControlMessage::Stop => {
                                active = false;
                                buffered = 0;
                            }
                            ControlMessage::Start => active = true,
                            ControlMessage::Config { .. } => {}
                        }
                    }

                    let len = 1 + (rng.next() % 1_500) as usize;
                    let out = p.process_block(&mut pending, &vec![0.1; len]);
                    assert!(pending.is_empty());

                    let mut expected_chunks = 0;
                    if active {
                        buffered += len;
                        expected_chunks = buffered / CHUNK;
                        buffered %= CHUNK;
                    }

                    assert_eq!(p.is_active(), active, "seed {seed}");
                    assert_eq!(audio_count(&out), expected_chunks, "seed {seed}");
                    assert_eq!(p.buffered_len(), buffered, "seed {seed}");
                    for message in &out {
                        if let ProcessorMessage::Audio(chunk) = message {
                            assert_eq!(chunk.len(), CHUNK);
                        }
                    }
                }
            }
        }
    }
}
