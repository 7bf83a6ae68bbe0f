use crate::{
    io::SliceSource,
    num::{u14, u15, u24, u28, u4, u7},
    time::{
        self, BarBeatFractionTimeSpan, BarBeatTicksTimeSpan, MetricTimeSpan, MidiTimeSpan,
        MusicalTimeSpan, TimeSpan, TimeSpanMode,
    },
    Chunk, Compression, ErrorKind, Event, EventKind, ExtraTrackChunkPolicy, Format, Fps, Header,
    InvalidMetaValuePolicy, InvalidValuePolicy, MetaMessage, MidiFile, MidiMessage,
    MtcQuarterFrameMessage, PitchBend, Policy, ReadingSettings, SmpteTime, SystemCommon,
    SystemRealtime, Tempo, TempoMap, TempoMapBuilder, TimeDivision, TimeSignature, Token,
    TokensReader, TokensWriter, TrackChunk, UnknownChunk, UnknownChunkIdPolicy, ValueChange,
    ValueLine, WritingSettings,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ev(delta: u32, kind: EventKind) -> Event {
    Event::new(u28::new(delta), kind)
}

fn note_on(delta: u32, key: u8, vel: u8) -> Event {
    ev(
        delta,
        EventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        },
    )
}

fn note_off(delta: u32, key: u8) -> Event {
    ev(
        delta,
        EventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        },
    )
}

fn meta(delta: u32, msg: MetaMessage) -> Event {
    ev(delta, EventKind::Meta(msg))
}

/// Raw bytes of a single track file, with the given track content.
fn single_track_smf(content: &[u8]) -> Vec<u8> {
    let mut raw = b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x00\x60MTrk".to_vec();
    raw.extend_from_slice(&(content.len() as u32).to_be_bytes());
    raw.extend_from_slice(content);
    raw
}

fn write_file(file: &MidiFile, settings: &WritingSettings) -> Vec<u8> {
    let mut out = Vec::new();
    file.write(&mut out, settings).unwrap();
    out
}

fn single_track_file(events: Vec<Event>) -> MidiFile {
    MidiFile::from_tracks(
        Format::SingleTrack,
        TimeDivision::DEFAULT,
        vec![TrackChunk::new(events)],
    )
}

fn tpq_map(tpq: u16) -> TempoMap {
    TempoMap::new(TimeDivision::TicksPerQuarterNote(u15::new(tpq)))
}

fn tempo(micros: u32) -> Tempo {
    Tempo::new(micros).unwrap()
}

fn sig(numerator: u8, denominator: u8) -> TimeSignature {
    TimeSignature::new(numerator, denominator).unwrap()
}

mod codec {
    use super::*;
    use crate::io::{ByteSource, StreamSource};
    use pretty_assertions::assert_eq;
    use std::io::{BufReader, Read};

    #[test]
    fn vlq() {
        let cases: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (0x40, &[0x40]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x00]),
            (0x2000, &[0xC0, 0x00]),
            (0x3FFF, &[0xFF, 0x7F]),
            (0x4000, &[0x81, 0x80, 0x00]),
            (0x0FFF_FFFF, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for &(int, raw) in cases {
            let mut out = Vec::new();
            u28::new(int).write_vlq(&mut out).unwrap();
            assert_eq!(out, raw, "encoding {:#X}", int);
            let read = u28::read_vlq(&mut SliceSource::new(raw)).unwrap();
            assert_eq!(read.as_int(), int, "decoding {:?}", raw);
        }
    }

    #[test]
    fn malformed_vlq() {
        let err = u28::read_vlq(&mut SliceSource::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]))
            .unwrap_err();
        assert!(err.is(err!(MalformedVlq, "")));
        let err = u28::read_vlq(&mut SliceSource::new(&[0x81])).unwrap_err();
        assert!(err.is(err!(MalformedVlq, "")));
        let err = u28::read_vlq(&mut SliceSource::new(&[])).unwrap_err();
        assert!(err.is(err!(NotEnoughBytes, "")));
    }

    #[test]
    fn rewrite() {
        init_logger();
        let file = single_track_file(vec![
            meta(0, MetaMessage::TrackName("piano".to_string())),
            meta(0, MetaMessage::Tempo(u24::new(400_000))),
            meta(
                0,
                MetaMessage::TimeSignature {
                    numerator: 6,
                    denominator: 8,
                    clocks_per_click: 36,
                    thirty_seconds_per_quarter: 8,
                },
            ),
            meta(
                0,
                MetaMessage::KeySignature {
                    key: -3,
                    minor: true,
                },
            ),
            note_on(0, 60, 100),
            note_on(10, 64, 90),
            ev(
                5,
                EventKind::Midi {
                    channel: u4::new(3),
                    message: MidiMessage::Controller {
                        controller: u7::new(7),
                        value: u7::new(127),
                    },
                },
            ),
            ev(
                0,
                EventKind::Midi {
                    channel: u4::new(3),
                    message: MidiMessage::PitchBend {
                        bend: PitchBend::from_int(-1000),
                    },
                },
            ),
            ev(0, EventKind::SysEx(vec![0x7E, 0x7F, 0x09, 0x01, 0xF7])),
            note_off(96, 60),
            note_off(0, 64),
            meta(20, MetaMessage::Marker("end".to_string())),
        ]);
        let raw = write_file(&file, &WritingSettings::default());
        assert_eq!(&raw[..4], b"MThd");
        let reread = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(reread, file);
    }

    #[test]
    fn chunk_size_matches_output() {
        let track = TrackChunk::new(vec![
            meta(0, MetaMessage::Text("hello".to_string())),
            note_on(0, 60, 100),
            note_on(1, 62, 100),
            note_off(200, 60),
            ev(0, EventKind::SysEx(vec![0x01; 200])),
        ]);
        let chunk = Chunk::Track(track);
        for compression in [Compression::NONE, Compression::ALL].iter() {
            let settings = WritingSettings {
                compression: *compression,
                ..WritingSettings::default()
            };
            let mut out = Vec::new();
            chunk.write(&settings, &mut out).unwrap();
            assert_eq!(chunk.size_of(&settings).unwrap(), out.len() as u64);
        }
    }

    #[test]
    fn running_status() {
        let file = single_track_file(vec![note_on(0, 60, 100), note_on(10, 62, 100)]);
        let full = write_file(
            &file,
            &WritingSettings {
                compression: Compression::NONE,
                ..WritingSettings::default()
            },
        );
        let compressed = write_file(&file, &WritingSettings::default());
        assert_eq!(full.len(), compressed.len() + 1);
        let settings = ReadingSettings::default();
        assert_eq!(MidiFile::read(&full, &settings).unwrap(), file);
        assert_eq!(MidiFile::read(&compressed, &settings).unwrap(), file);
    }

    #[test]
    fn running_status_without_status() {
        let raw = single_track_smf(&[0x00, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]);
        let err = MidiFile::read(&raw, &ReadingSettings::default()).unwrap_err();
        assert!(err.is(err!(UnexpectedRunningStatus, "")));
    }

    #[test]
    fn invalid_data_byte() {
        init_logger();
        let raw = single_track_smf(&[0x00, 0x90, 0x3C, 200, 0x00, 0xFF, 0x2F, 0x00]);
        let read_with = |policy| {
            let settings = ReadingSettings {
                invalid_channel_event_parameter_value: policy,
                ..ReadingSettings::default()
            };
            MidiFile::read(&raw, &settings)
        };

        let err = read_with(InvalidValuePolicy::Abort).unwrap_err();
        assert!(err.is(err!(InvalidChannelEventParameterValue, "")));
        assert!(matches!(
            err.root_kind(),
            ErrorKind::InvalidChannelEventParameterValue(_)
        ));

        let file = read_with(InvalidValuePolicy::ReadValid).unwrap();
        assert_eq!(file.tracks().next().unwrap().events, vec![note_on(0, 60, 72)]);

        let file = read_with(InvalidValuePolicy::SnapToLimits).unwrap();
        assert_eq!(file.tracks().next().unwrap().events, vec![note_on(0, 60, 127)]);
    }

    #[test]
    fn silent_note_on() {
        let raw = single_track_smf(&[0x00, 0x90, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00]);
        let file = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(file.tracks().next().unwrap().events, vec![note_off(0, 60)]);

        let settings = ReadingSettings {
            silent_note_on: crate::SilentNoteOnPolicy::NoteOn,
            ..ReadingSettings::default()
        };
        let file = MidiFile::read(&raw, &settings).unwrap();
        assert_eq!(file.tracks().next().unwrap().events, vec![note_on(0, 60, 0)]);
    }

    #[test]
    fn missed_end_of_track() {
        let raw = single_track_smf(&[0x00, 0x90, 0x3C, 0x40, 0x60, 0x80, 0x3C, 0x00]);
        let file = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(
            file.tracks().next().unwrap().events,
            vec![note_on(0, 60, 64), note_off(96, 60)]
        );

        let settings = ReadingSettings {
            missed_end_of_track: Policy::Abort,
            ..ReadingSettings::default()
        };
        let err = MidiFile::read(&raw, &settings).unwrap_err();
        assert!(err.is(err!(MissedEndOfTrackEvent, "")));
    }

    #[test]
    fn truncated_file() {
        //The second event is cut in half
        let mut raw = single_track_smf(&[0x00, 0x90, 0x3C, 0x40, 0x60, 0x80, 0x3C, 0x00]);
        raw.truncate(raw.len() - 2);

        let err = MidiFile::read(&raw, &ReadingSettings::default()).unwrap_err();
        assert!(err.is(err!(NotEnoughBytes, "")));

        let settings = ReadingSettings {
            not_enough_bytes: Policy::Ignore,
            ..ReadingSettings::default()
        };
        let file = MidiFile::read(&raw, &settings).unwrap();
        assert_eq!(file.tracks().next().unwrap().events, vec![note_on(0, 60, 64)]);
    }

    #[test]
    fn dropped_events_keep_their_delta() {
        //An unknown status byte between two notes
        let raw = single_track_smf(&[
            0x00, 0x90, 0x3C, 0x40, 0x10, 0xF4, 0x20, 0x80, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00,
        ]);
        let err = MidiFile::read(&raw, &ReadingSettings::default()).unwrap_err();
        assert!(err.is(err!(UnknownChannelEvent, "")));

        let settings = ReadingSettings {
            unknown_channel_event: crate::UnknownChannelEventPolicy::SkipStatusByte,
            ..ReadingSettings::default()
        };
        let file = MidiFile::read(&raw, &settings).unwrap();
        assert_eq!(
            file.tracks().next().unwrap().events,
            vec![note_on(0, 60, 64), note_off(0x30, 60)]
        );
    }

    #[test]
    fn invalid_chunk_size() {
        //Declares one extra byte of content
        let mut raw = single_track_smf(&[0x00, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]);
        raw[21] += 1;
        raw.push(0x00);
        let err = MidiFile::read(&raw, &ReadingSettings::default()).unwrap_err();
        assert!(err.is(err!(InvalidChunkSize, "")));

        let settings = ReadingSettings {
            invalid_chunk_size: Policy::Ignore,
            ..ReadingSettings::default()
        };
        let file = MidiFile::read(&raw, &settings).unwrap();
        assert_eq!(file.tracks().next().unwrap().events, vec![note_on(0, 60, 64)]);
    }

    #[test]
    fn no_header_chunk() {
        let raw = single_track_smf(&[0x00, 0xFF, 0x2F, 0x00]);
        let err = MidiFile::read(&raw[14..], &ReadingSettings::default()).unwrap_err();
        assert!(err.is(err!(NoHeaderChunk, "")));

        let settings = ReadingSettings {
            no_header_chunk: Policy::Ignore,
            ..ReadingSettings::default()
        };
        let file = MidiFile::read(&raw[14..], &settings).unwrap();
        assert_eq!(file.time_division, TimeDivision::DEFAULT);
        assert_eq!(file.tracks().count(), 1);
    }

    #[test]
    fn track_count_mismatch() {
        let mut raw = single_track_smf(&[0x00, 0xFF, 0x2F, 0x00]);
        raw[11] = 2;
        let file = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(file.tracks().count(), 1);

        let settings = ReadingSettings {
            unexpected_track_chunks_count: Policy::Abort,
            ..ReadingSettings::default()
        };
        let err = MidiFile::read(&raw, &settings).unwrap_err();
        assert!(err.is(err!(UnexpectedTrackChunksCount, "")));
    }

    #[test]
    fn unknown_chunks() {
        let mut raw = single_track_smf(&[0x00, 0xFF, 0x2F, 0x00]);
        raw.extend_from_slice(b"XTRA\x00\x00\x00\x03abc");

        let file = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(
            file.chunks.last(),
            Some(&Chunk::Unknown(UnknownChunk {
                id: *b"XTRA",
                data: b"abc".to_vec(),
            }))
        );
        assert_eq!(write_file(&file, &WritingSettings::default()), raw);

        let settings = ReadingSettings {
            unknown_chunk_id: UnknownChunkIdPolicy::Skip,
            ..ReadingSettings::default()
        };
        let file = MidiFile::read(&raw, &settings).unwrap();
        assert_eq!(file.chunks.len(), 1);

        let settings = ReadingSettings {
            unknown_chunk_id: UnknownChunkIdPolicy::Abort,
            ..ReadingSettings::default()
        };
        let err = MidiFile::read(&raw, &settings).unwrap_err();
        assert!(err.is(err!(UnknownChunkId, "")));
    }

    #[test]
    fn rmid() {
        let smf = single_track_smf(&[0x00, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]);
        let mut raw = b"RIFF".to_vec();
        raw.extend_from_slice(&(4 + 8 + 4 + 8 + smf.len() as u32).to_le_bytes());
        raw.extend_from_slice(b"RMID");
        //A padded chunk before the data chunk
        raw.extend_from_slice(b"INFO\x03\x00\x00\x00xyz\x00");
        raw.extend_from_slice(b"data");
        raw.extend_from_slice(&(smf.len() as u32).to_le_bytes());
        raw.extend_from_slice(&smf);
        //Trailing riff data is not part of the midi file
        raw.extend_from_slice(b"DISP\x00\x00\x00\x00");

        let settings = ReadingSettings::default();
        let plain = MidiFile::read(&smf, &settings).unwrap();
        assert_eq!(MidiFile::read(&raw, &settings).unwrap(), plain);
        assert_eq!(MidiFile::read_from(&raw[..], &settings).unwrap(), plain);
    }

    #[test]
    fn smpte_division() {
        let file = MidiFile::new(Format::Parallel, TimeDivision::Smpte(Fps::Fps25, 40));
        let raw = write_file(&file, &WritingSettings::default());
        assert_eq!(&raw[12..14], &[0xE7, 40]);
        let reread = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(reread.time_division, TimeDivision::Smpte(Fps::Fps25, 40));
    }

    #[test]
    fn stream_io() {
        let file = single_track_file(vec![note_on(0, 60, 100), note_off(96, 60)]);
        let mut out = Vec::new();
        file.write_std(&mut out, &WritingSettings::default()).unwrap();
        assert_eq!(out, write_file(&file, &WritingSettings::default()));
        let reread = MidiFile::read_from(&out[..], &ReadingSettings::default()).unwrap();
        assert_eq!(reread, file);
    }

    #[test]
    fn text_encoding() {
        let file = single_track_file(vec![meta(0, MetaMessage::Lyric("ñandú".to_string()))]);
        let utf8 = crate::TextEncoding::Encoding(encoding_rs::UTF_8);
        let raw = write_file(
            &file,
            &WritingSettings {
                text_encoding: utf8,
                ..WritingSettings::default()
            },
        );
        let reread = MidiFile::read(
            &raw,
            &ReadingSettings {
                text_encoding: utf8,
                ..ReadingSettings::default()
            },
        )
        .unwrap();
        assert_eq!(reread, file);

        //Ascii replaces anything it can't represent
        let reread = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(
            reread.tracks().next().unwrap().events,
            vec![meta(0, MetaMessage::Lyric("??and??".to_string()))]
        );
    }

    #[test]
    fn delete_default_meta_events() {
        let file = single_track_file(vec![
            meta(5, MetaMessage::Tempo(u24::new(MetaMessage::DEFAULT_TEMPO))),
            meta(1, MetaMessage::DEFAULT_TIME_SIGNATURE),
            meta(1, MetaMessage::DEFAULT_KEY_SIGNATURE),
            note_on(10, 60, 100),
            meta(0, MetaMessage::Tempo(u24::new(400_000))),
            meta(2, MetaMessage::Tempo(u24::new(MetaMessage::DEFAULT_TEMPO))),
            meta(3, MetaMessage::Unknown(0x60, vec![1, 2])),
        ]);
        let settings = WritingSettings {
            compression: Compression::DELETE_DEFAULT_SET_TEMPO
                | Compression::DELETE_DEFAULT_TIME_SIGNATURE
                | Compression::DELETE_DEFAULT_KEY_SIGNATURE
                | Compression::DELETE_UNKNOWN_META_EVENTS,
            ..WritingSettings::default()
        };
        let raw = write_file(&file, &settings);
        let reread = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        //Default events are deleted until the first non-default one, and their deltas are kept
        assert_eq!(
            reread.tracks().next().unwrap().events,
            vec![
                note_on(17, 60, 100),
                meta(0, MetaMessage::Tempo(u24::new(400_000))),
                meta(2, MetaMessage::Tempo(u24::new(MetaMessage::DEFAULT_TEMPO))),
            ]
        );
        //The delta of the trailing deleted event lands on the end of track
        assert_eq!(&raw[raw.len() - 4..], &[0x03, 0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn note_off_as_silent_note_on() {
        let file = single_track_file(vec![note_on(0, 60, 100), note_off(96, 60)]);
        let settings = WritingSettings {
            compression: Compression::USE_RUNNING_STATUS | Compression::NOTE_OFF_AS_SILENT_NOTE_ON,
            ..WritingSettings::default()
        };
        let compressed = write_file(&file, &settings);
        let plain = write_file(&file, &WritingSettings::default());
        assert_eq!(compressed.len() + 1, plain.len());
        let reread = MidiFile::read(&compressed, &ReadingSettings::default()).unwrap();
        assert_eq!(reread, file);
    }

    #[test]
    fn compression_flags() {
        let all = Compression::ALL;
        assert!(all.contains(Compression::USE_RUNNING_STATUS));
        assert!(all.contains(Compression::DELETE_UNKNOWN_META_EVENTS));
        let some = all - Compression::USE_RUNNING_STATUS;
        assert!(!some.contains(Compression::USE_RUNNING_STATUS));
        assert!(some.contains(Compression::NOTE_OFF_AS_SILENT_NOTE_ON));
        let mut none = Compression::NONE;
        assert!(!none.contains(Compression::DELETE_DEFAULT_SET_TEMPO));
        none |= Compression::DELETE_DEFAULT_SET_TEMPO;
        assert!(none.contains(Compression::DELETE_DEFAULT_SET_TEMPO));
    }

    #[test]
    fn timed_events() {
        let file = MidiFile::from_tracks(
            Format::Parallel,
            TimeDivision::DEFAULT,
            vec![
                TrackChunk::new(vec![note_on(0, 60, 1), note_on(10, 61, 1)]),
                TrackChunk::new(vec![note_on(5, 62, 1), note_on(5, 63, 1)]),
            ],
        );
        let order = file
            .timed_events()
            .map(|(time, track, _ev)| (time, track))
            .collect::<Vec<_>>();
        assert_eq!(order, vec![(0, 0), (5, 1), (10, 0), (10, 1)]);
    }

    #[test]
    fn invalid_meta_values() {
        init_logger();
        let read_with = |content: &[u8], policy| {
            let settings = ReadingSettings {
                invalid_meta_event_parameter_value: policy,
                ..ReadingSettings::default()
            };
            MidiFile::read(&single_track_smf(content), &settings)
                .map(|file| file.tracks().next().unwrap().events.clone())
        };
        //Each bad meta event comes 5 ticks in, followed by a note 16 ticks later
        let with_note = |meta: &[u8]| {
            let mut content = vec![0x05];
            content.extend_from_slice(meta);
            content.extend_from_slice(&[0x10, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]);
            content
        };
        let key = with_note(&[0xFF, 0x59, 0x02, 0x09, 0x00]);
        //Frame 27 at 25 fps
        let smpte = with_note(&[0xFF, 0x54, 0x05, 0x21, 0x02, 0x03, 27, 0x00]);
        let denominator = with_note(&[0xFF, 0x58, 0x04, 0x04, 0x08, 0x18, 0x08]);

        for &content in [&key[..], &smpte[..], &denominator[..]].iter() {
            let err = read_with(content, InvalidMetaValuePolicy::Abort).unwrap_err();
            assert!(
                matches!(err.kind(), ErrorKind::InvalidMetaEventParameterValue(_)),
                "{:?}",
                err
            );
            assert_eq!(
                read_with(content, InvalidMetaValuePolicy::Ignore).unwrap(),
                vec![note_on(0x15, 60, 64)]
            );
        }

        let snapped = |content: &[u8]| {
            read_with(content, InvalidMetaValuePolicy::SnapToLimits).unwrap()[0].clone()
        };
        assert_eq!(
            snapped(&key[..]),
            meta(
                5,
                MetaMessage::KeySignature {
                    key: 7,
                    minor: false
                }
            )
        );
        assert_eq!(
            snapped(&smpte[..]),
            meta(
                5,
                MetaMessage::SmpteOffset(SmpteTime::new(1, 2, 3, 24, 0, Fps::Fps25).unwrap())
            )
        );
        assert_eq!(
            snapped(&denominator[..]),
            meta(
                5,
                MetaMessage::TimeSignature {
                    numerator: 4,
                    denominator: 128,
                    clocks_per_click: 24,
                    thirty_seconds_per_quarter: 8,
                }
            )
        );
    }

    #[test]
    fn invalid_system_common_values() {
        //Song position whose low data byte has its top bit set
        let raw = single_track_smf(&[0x00, 0xF2, 0x81, 0x01, 0x00, 0xFF, 0x2F, 0x00]);
        let read_with = |policy| {
            let settings = ReadingSettings {
                invalid_system_common_event_parameter_value: policy,
                ..ReadingSettings::default()
            };
            MidiFile::read(&raw, &settings)
        };

        let err = read_with(InvalidValuePolicy::Abort).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::InvalidSystemCommonEventParameterValue(_)
        ));

        let position = |pos: u16| {
            vec![ev(
                0,
                EventKind::Common(SystemCommon::SongPosition(u14::new(pos))),
            )]
        };
        let file = read_with(InvalidValuePolicy::ReadValid).unwrap();
        assert_eq!(file.tracks().next().unwrap().events, position(0x81));
        let file = read_with(InvalidValuePolicy::SnapToLimits).unwrap();
        assert_eq!(file.tracks().next().unwrap().events, position(0xFF));
    }

    #[test]
    fn system_events_in_tracks() {
        let raw = single_track_smf(&[
            0x00, 0xF1, 0x35, 0x00, 0xF3, 0x07, 0x00, 0xF6, 0x01, 0xF8, 0x00, 0xFA, 0x00, 0xFB,
            0x00, 0xFC, 0x00, 0xFE, 0x10, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00,
        ]);
        let file = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        let realtime = |delta, msg| ev(delta, EventKind::Realtime(msg));
        assert_eq!(
            file.tracks().next().unwrap().events,
            vec![
                ev(
                    0,
                    EventKind::Common(SystemCommon::MidiTimeCodeQuarterFrame(
                        MtcQuarterFrameMessage::SecondsHigh,
                        u4::new(5)
                    ))
                ),
                ev(0, EventKind::Common(SystemCommon::SongSelect(u7::new(7)))),
                ev(0, EventKind::Common(SystemCommon::TuneRequest)),
                realtime(1, SystemRealtime::TimingClock),
                realtime(0, SystemRealtime::Start),
                realtime(0, SystemRealtime::Continue),
                realtime(0, SystemRealtime::Stop),
                realtime(0, SystemRealtime::ActiveSensing),
                note_on(0x10, 60, 64),
            ]
        );

        //Tracks never carry them when written, their deltas move on to the next event
        let raw = write_file(&file, &WritingSettings::default());
        let reread = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(
            reread.tracks().next().unwrap().events,
            vec![note_on(0x11, 60, 64)]
        );
    }

    #[test]
    fn every_event_kind() {
        let midi = |delta, channel, message| {
            ev(
                delta,
                EventKind::Midi {
                    channel: u4::new(channel),
                    message,
                },
            )
        };
        let file = single_track_file(vec![
            meta(0, MetaMessage::TrackNumber(Some(3))),
            meta(0, MetaMessage::TrackNumber(None)),
            meta(0, MetaMessage::Text("text".to_string())),
            meta(0, MetaMessage::Copyright("(c)".to_string())),
            meta(0, MetaMessage::TrackName("name".to_string())),
            meta(0, MetaMessage::InstrumentName("organ".to_string())),
            meta(0, MetaMessage::Lyric("la".to_string())),
            meta(0, MetaMessage::Marker("A".to_string())),
            meta(0, MetaMessage::CuePoint("cue".to_string())),
            meta(0, MetaMessage::ProgramName("prog".to_string())),
            meta(0, MetaMessage::DeviceName("dev".to_string())),
            meta(0, MetaMessage::ChannelPrefix(u4::new(9))),
            meta(0, MetaMessage::Port(u7::new(2))),
            meta(0, MetaMessage::Tempo(u24::new(MetaMessage::DEFAULT_TEMPO))),
            meta(
                0,
                MetaMessage::SmpteOffset(SmpteTime::new(1, 2, 3, 4, 5, Fps::Fps30).unwrap()),
            ),
            meta(0, MetaMessage::DEFAULT_TIME_SIGNATURE),
            meta(0, MetaMessage::DEFAULT_KEY_SIGNATURE),
            meta(0, MetaMessage::SequencerSpecific(vec![0x00, 0x20, 0x29])),
            meta(0, MetaMessage::Unknown(0x60, vec![7])),
            midi(1, 0, MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(90) }),
            midi(1, 0, MidiMessage::NoteOn { key: u7::new(62), vel: u7::new(90) }),
            midi(1, 1, MidiMessage::Aftertouch { key: u7::new(60), vel: u7::new(30) }),
            midi(1, 2, MidiMessage::Controller { controller: u7::new(64), value: u7::new(127) }),
            midi(1, 3, MidiMessage::ProgramChange { program: u7::new(19) }),
            midi(1, 4, MidiMessage::ChannelAftertouch { vel: u7::new(50) }),
            midi(1, 5, MidiMessage::PitchBend { bend: PitchBend::from_int(4000) }),
            midi(1, 0, MidiMessage::NoteOff { key: u7::new(60), vel: u7::new(64) }),
            ev(0, EventKind::SysEx(vec![0x43, 0x10, 0x4C, 0xF7])),
            ev(0, EventKind::Escape(vec![0xF3, 0x01])),
        ]);
        let settings = WritingSettings {
            compression: Compression::NONE,
            ..WritingSettings::default()
        };
        let raw = write_file(&file, &settings);
        assert_eq!(MidiFile::read(&raw, &ReadingSettings::default()).unwrap(), file);
        //Only the repeated note on status could have been left out
        assert_eq!(raw.len(), write_file(&file, &WritingSettings::default()).len() + 1);
    }

    #[test]
    fn extra_track_chunks() {
        let mut raw = single_track_smf(&[0x00, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]);
        raw.extend_from_slice(b"MTrk\x00\x00\x00\x08\x00\x90\x3E\x40\x00\xFF\x2F\x00");

        let file = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(file.tracks().count(), 2);

        let settings = ReadingSettings {
            extra_track_chunk: ExtraTrackChunkPolicy::Skip,
            unexpected_track_chunks_count: Policy::Abort,
            ..ReadingSettings::default()
        };
        let file = MidiFile::read(&raw, &settings).unwrap();
        assert_eq!(
            file.tracks().map(|track| track.events.clone()).collect::<Vec<_>>(),
            vec![vec![note_on(0, 60, 64)]]
        );
    }

    #[test]
    fn stop_reading_on_expected_track_count() {
        let mut raw = single_track_smf(&[0x00, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]);
        raw.extend_from_slice(b"XTRA\x00\x00\x00\x01z");
        let mut settings = ReadingSettings {
            unknown_chunk_id: UnknownChunkIdPolicy::Abort,
            ..ReadingSettings::default()
        };
        let err = MidiFile::read(&raw, &settings).unwrap_err();
        assert!(err.is(err!(UnknownChunkId, "")));

        //Whatever follows the last declared track is never looked at
        settings.stop_reading_on_expected_track_count = true;
        let file = MidiFile::read(&raw, &settings).unwrap();
        assert_eq!(file.chunks.len(), 1);
        assert_eq!(file.tracks().next().unwrap().events, vec![note_on(0, 60, 64)]);
    }

    #[test]
    fn unknown_file_format() {
        let mut raw = single_track_smf(&[0x00, 0xFF, 0x2F, 0x00]);
        raw[9] = 7;
        let file = MidiFile::read(&raw, &ReadingSettings::default()).unwrap();
        assert_eq!(file.format, Format::Parallel);
        assert_eq!(file.tracks().count(), 1);

        let settings = ReadingSettings {
            unknown_file_format: Policy::Abort,
            ..ReadingSettings::default()
        };
        let err = MidiFile::read(&raw, &settings).unwrap_err();
        assert!(err.is(err!(UnknownFileFormat, "")));
    }

    /// Two tracks with enough events to be encoded and decoded on the thread pool.
    fn large_file() -> MidiFile {
        let track = |key: u8| {
            TrackChunk::new(
                (0..600)
                    .flat_map(|i| {
                        let delta = if i == 0 { 0 } else { 10 };
                        vec![note_on(delta, key, 100), note_off(10, key)]
                    })
                    .collect(),
            )
        };
        MidiFile::from_tracks(
            Format::Parallel,
            TimeDivision::DEFAULT,
            vec![track(60), track(64)],
        )
    }

    #[test]
    fn large_file_roundtrip() {
        init_logger();
        let file = large_file();
        let settings = WritingSettings::default();
        let raw = write_file(&file, &settings);
        assert!(raw.len() >= 3 * 1024);

        //Chunks encoded on the thread pool come out in order, just like one by one
        let mut expected = Vec::new();
        Chunk::Header(file.header().unwrap())
            .write(&settings, &mut expected)
            .unwrap();
        for chunk in file.chunks.iter() {
            chunk.write(&settings, &mut expected).unwrap();
        }
        assert_eq!(raw, expected);

        let settings = ReadingSettings::default();
        assert_eq!(MidiFile::read(&raw, &settings).unwrap(), file);
        assert_eq!(
            crate::smf::read_sequential(&mut SliceSource::new(&raw), &settings).unwrap(),
            file
        );
        #[cfg(feature = "parallel")]
        assert_eq!(crate::smf::read_parallel(&raw, &settings).unwrap(), file);
    }

    #[test]
    fn large_truncated_file() {
        let mut raw = write_file(&large_file(), &WritingSettings::default());
        raw.truncate(raw.len() - 100);
        let settings = ReadingSettings {
            not_enough_bytes: Policy::Ignore,
            invalid_chunk_size: Policy::Ignore,
            ..ReadingSettings::default()
        };
        let file = MidiFile::read(&raw, &settings).unwrap();
        assert_eq!(
            file,
            crate::smf::read_sequential(&mut SliceSource::new(&raw), &settings).unwrap()
        );
        assert_eq!(file.tracks().count(), 2);
        assert_eq!(file.tracks().next().unwrap().events.len(), 1200);
        assert!(file.tracks().nth(1).unwrap().events.len() < 1200);
    }

    /// Hands out a single byte per read call.
    struct Trickle<'a>(&'a [u8]);
    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match (self.0.split_first(), buf.first_mut()) {
                (Some((&byte, rest)), Some(slot)) => {
                    *slot = byte;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    #[test]
    fn rmid_from_trickling_reader() {
        let smf = single_track_smf(&[0x00, 0x90, 0x3C, 0x40, 0x00, 0xFF, 0x2F, 0x00]);
        let mut raw = b"RIFF".to_vec();
        raw.extend_from_slice(&(4 + 8 + smf.len() as u32).to_le_bytes());
        raw.extend_from_slice(b"RMIDdata");
        raw.extend_from_slice(&(smf.len() as u32).to_le_bytes());
        raw.extend_from_slice(&smf);

        let settings = ReadingSettings::default();
        let plain = MidiFile::read(&smf, &settings).unwrap();
        assert_eq!(MidiFile::read_from(Trickle(&raw), &settings).unwrap(), plain);
        assert_eq!(MidiFile::read_from(Trickle(&smf), &settings).unwrap(), plain);

        let mut src = StreamSource::new(BufReader::new(Trickle(b"RIFFxyz")));
        let mut id = [0; 4];
        assert_eq!(src.peek_up_to(&mut id).unwrap(), 4);
        assert_eq!(&id, b"RIFF");
        let mut all = [0; 8];
        assert_eq!(src.read_up_to(&mut all).unwrap(), 7);
        assert_eq!(&all[..7], b"RIFFxyz");
        assert!(src.at_end().unwrap());
    }
}

mod lazy {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn read_tokens() {
        let content = [
            0x00, 0x90, 0x3C, 0x40, 0x60, 0x80, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00,
        ];
        let raw = single_track_smf(&content);
        let tokens = TokensReader::from_slice(&raw, ReadingSettings::default())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::ChunkHeader {
                    id: *b"MThd",
                    size: 6
                },
                Token::FileHeader(Header::new(Format::SingleTrack, 1, TimeDivision::DEFAULT)),
                Token::ChunkHeader {
                    id: *b"MTrk",
                    size: content.len() as u32
                },
                Token::Event(note_on(0, 60, 64)),
                Token::Event(note_off(96, 60)),
            ]
        );

        //Streams give the same tokens
        let streamed = TokensReader::from_reader(&raw[..], ReadingSettings::default())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(streamed, tokens);
    }

    #[test]
    fn bytes_packets() {
        let mut raw = single_track_smf(&[0x00, 0xFF, 0x2F, 0x00]);
        raw.extend_from_slice(b"XTRA\x00\x00\x00\x05abcde");
        let settings = ReadingSettings {
            bytes_packet_size: 2,
            ..ReadingSettings::default()
        };
        let packets = TokensReader::from_slice(&raw, settings)
            .filter_map(|token| match token.unwrap() {
                Token::BytesPacket(bytes) => Some(bytes),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(packets, vec![b"ab".to_vec(), b"cd".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn reader_stops_after_error() {
        let raw = single_track_smf(&[0x00, 0x90, 0x3C, 200, 0x00, 0xFF, 0x2F, 0x00]);
        let mut reader = TokensReader::from_slice(&raw, ReadingSettings::default());
        let mut got_error = false;
        while let Some(token) = reader.read_token().transpose() {
            if let Err(err) = token {
                assert!(err.is(err!(InvalidChannelEventParameterValue, "")));
                got_error = true;
            }
        }
        assert!(got_error);
        assert!(reader.read_token().unwrap().is_none());
    }

    #[test]
    fn tempo_map_from_tokens() {
        let file = single_track_file(vec![
            meta(0, MetaMessage::Tempo(u24::new(250_000))),
            note_on(96, 60, 100),
            meta(96, MetaMessage::Tempo(u24::new(1_000_000))),
        ]);
        let raw = write_file(&file, &WritingSettings::default());

        let mut builder = TempoMapBuilder::new(TimeDivision::DEFAULT);
        for token in TokensReader::from_slice(&raw, ReadingSettings::default()) {
            match token.unwrap() {
                Token::ChunkHeader { id, .. } if &id == b"MTrk" => builder.start_track(),
                Token::Event(ev) => builder.push_event(&ev),
                _ => {}
            }
        }
        let map = builder.build();
        assert_eq!(map, TempoMap::from_file(&file));
        assert_eq!(map.tempo_at(191), tempo(250_000));
        assert_eq!(map.tempo_at(192), tempo(1_000_000));
    }

    #[test]
    fn write_tokens() {
        let events = vec![note_on(0, 60, 100), note_on(10, 62, 100), note_off(96, 60)];
        let mut out = Vec::new();
        let mut writer = TokensWriter::new(
            &mut out,
            WritingSettings::default(),
            Format::Parallel,
            TimeDivision::DEFAULT,
        )
        .unwrap();
        writer.start_track_chunk().unwrap();
        for ev in events.iter() {
            writer.write_event(ev).unwrap();
        }
        writer.start_track_chunk().unwrap();
        writer.write_event(&note_on(0, 70, 100)).unwrap();
        writer
            .write_chunk(&Chunk::Unknown(UnknownChunk {
                id: *b"XTRA",
                data: vec![1, 2, 3],
            }))
            .unwrap_err();
        writer.end_track_chunk().unwrap();
        writer
            .write_chunk(&Chunk::Unknown(UnknownChunk {
                id: *b"XTRA",
                data: vec![1, 2, 3],
            }))
            .unwrap();
        writer.finish().unwrap();
        drop(writer);

        let mut expected = MidiFile::from_tracks(
            Format::Parallel,
            TimeDivision::DEFAULT,
            vec![
                TrackChunk::new(events),
                TrackChunk::new(vec![note_on(0, 70, 100)]),
            ],
        );
        expected.chunks.push(Chunk::Unknown(UnknownChunk {
            id: *b"XTRA",
            data: vec![1, 2, 3],
        }));
        assert_eq!(out, write_file(&expected, &WritingSettings::default()));
    }

    #[test]
    fn writer_misuse() {
        let mut out = Vec::new();
        let mut writer = TokensWriter::new(
            &mut out,
            WritingSettings::default(),
            Format::SingleTrack,
            TimeDivision::DEFAULT,
        )
        .unwrap();
        let invalid = |res: crate::Result<()>| res.unwrap_err().is(err!(InvalidOperation, ""));

        assert!(invalid(writer.write_event(&note_on(0, 60, 1))));
        assert!(invalid(writer.end_track_chunk()));
        assert!(invalid(writer.write_chunk(&Chunk::Header(Header::new(
            Format::SingleTrack,
            1,
            TimeDivision::DEFAULT
        )))));

        writer.start_track_chunk().unwrap();
        writer.write_event(&meta(4, MetaMessage::EndOfTrack)).unwrap();
        assert!(invalid(writer.write_event(&note_on(0, 60, 1))));

        writer.finish().unwrap();
        assert!(invalid(writer.start_track_chunk()));
        assert!(invalid(writer.finish()));
        drop(writer);

        //The explicit end of track delta is not lost
        let file = MidiFile::read(&out, &ReadingSettings::default()).unwrap();
        assert_eq!(file.tracks().count(), 1);
        assert_eq!(&out[out.len() - 4..], &[0x04, 0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn writer_finishes_on_drop() {
        init_logger();
        let mut out = Vec::new();
        {
            let mut writer = TokensWriter::new(
                &mut out,
                WritingSettings::default(),
                Format::SingleTrack,
                TimeDivision::DEFAULT,
            )
            .unwrap();
            writer.start_track_chunk().unwrap();
            writer.write_event(&note_on(0, 60, 100)).unwrap();
        }
        let file = MidiFile::read(&out, &ReadingSettings::default()).unwrap();
        assert_eq!(file, single_track_file(vec![note_on(0, 60, 100)]));
    }
}

mod tempo {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn value_line_set() {
        let mut line = ValueLine::new(1u32);
        assert!(!line.set(0, 1));
        assert!(line.set(10, 5));
        assert!(!line.set(10, 5));
        //Same value as the one in effect collapses
        assert!(!line.set(20, 5));
        assert_eq!(line.changes().len(), 1);
        assert_eq!(*line.value_at(9), 1);
        assert_eq!(*line.value_at(10), 5);
        assert_eq!(*line.value_at(1000), 5);

        //An earlier change folds later equal changes
        assert!(line.set(0, 5));
        assert_eq!(line.changes().len(), 1);
        assert_eq!(line.changes()[0].time, 0);
        assert_eq!(*line.default_value(), 1);

        assert!(line.set(30, 2));
        assert!(line.set(20, 2));
        assert_eq!(line.changes().len(), 2);
        assert_eq!(line.changes()[1].time, 20);
        line.clear();
        assert!(line.changes().is_empty());
        assert_eq!(*line.value_at(40), 1);
    }

    #[test]
    fn value_line_set_matches_full_normalization() {
        //Apply every set to a plain list too, and normalize that list from scratch
        let mut line = ValueLine::new(0u8);
        let mut plain: Vec<ValueChange<u8>> = Vec::new();
        let mut seed = 7u32;
        for _ in 0..3000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let time = ((seed >> 8) % 64) as u64;
            let value = ((seed >> 20) % 3) as u8;

            let before = plain.clone();
            match plain.binary_search_by_key(&time, |change| change.time) {
                Ok(idx) => plain[idx].value = value,
                Err(idx) => plain.insert(idx, ValueChange { time, value }),
            }
            let mut last = 0;
            plain.retain(|change| {
                let keep = change.value != last;
                last = change.value;
                keep
            });

            assert_eq!(line.set(time, value), plain != before);
            assert_eq!(line.changes(), &plain[..]);
        }

        //Building a long line stays cheap
        let mut line = ValueLine::new(0u32);
        for i in 0..100_000u64 {
            line.set(i, (i % 2) as u32 + 1);
        }
        assert_eq!(line.changes().len(), 100_000);
    }

    #[test]
    fn value_line_queries() {
        let mut line = ValueLine::new('a');
        line.set(10, 'b');
        line.set(20, 'c');
        line.set(30, 'd');
        assert_eq!(line.next_change_after(0).map(|c| c.time), Some(10));
        assert_eq!(line.next_change_after(10).map(|c| c.time), Some(20));
        assert_eq!(line.next_change_after(30).map(|c| c.time), None);
        let between = line
            .changes_between(10, 30)
            .iter()
            .map(|c| c.value)
            .collect::<String>();
        assert_eq!(between, "bc");
        assert_eq!((&line).into_iter().count(), 3);
    }

    #[test]
    fn value_line_flip() {
        let mut line = ValueLine::new(1u32);
        line.set(4, 2);
        let flipped = line.flip(5);
        assert_eq!(*flipped.default_value(), 2);
        assert_eq!(flipped.changes().len(), 1);
        assert_eq!(flipped.changes()[0].time, 6);
        assert_eq!(flipped.changes()[0].value, 1);
        //Walking forward from the center walks backward through the unflipped line
        for t in 5..10 {
            assert_eq!(flipped.value_at(t), line.value_at(2 * 5 - t - 1));
        }
    }

    #[test]
    fn tempo_values() {
        let t = Tempo::from_bpm(120.0).unwrap();
        assert_eq!(t, Tempo::DEFAULT);
        approx::assert_relative_eq!(tempo(400_000).bpm(), 150.0);
        assert_eq!(Tempo::from_millis(250).unwrap(), tempo(250_000));
        assert!(Tempo::new(0).unwrap_err().is(err!(OutOfRange, "")));
        assert!(Tempo::new(0x100_0000).unwrap_err().is(err!(OutOfRange, "")));
        assert!(Tempo::from_bpm(-5.0).is_err());
        assert_eq!(
            tempo(250_000).to_meta(),
            MetaMessage::Tempo(u24::new(250_000))
        );
    }

    #[test]
    fn time_signature_values() {
        let s = sig(6, 8);
        assert_eq!(s.beat_length(96), 48);
        assert_eq!(s.bar_length(96), 288);
        assert_eq!(TimeSignature::DEFAULT.bar_length(96), 384);
        assert!(TimeSignature::new(3, 3).unwrap_err().is(err!(OutOfRange, "")));
        assert!(TimeSignature::new(0, 4).unwrap_err().is(err!(OutOfRange, "")));
        //Tiny divisions never produce empty beats
        assert_eq!(sig(1, 128).beat_length(1), 1);
    }

    #[test]
    fn from_file() {
        let file = MidiFile::from_tracks(
            Format::Parallel,
            TimeDivision::DEFAULT,
            vec![
                TrackChunk::new(vec![
                    meta(0, MetaMessage::Tempo(u24::new(120_000))),
                    meta(
                        384,
                        MetaMessage::TimeSignature {
                            numerator: 3,
                            denominator: 4,
                            clocks_per_click: 24,
                            thirty_seconds_per_quarter: 8,
                        },
                    ),
                    //Zero tempo is skipped
                    meta(10, MetaMessage::Tempo(u24::new(0))),
                ]),
                TrackChunk::new(vec![meta(200, MetaMessage::Tempo(u24::new(600_000)))]),
            ],
        );
        let map = TempoMap::from_file(&file);
        assert_eq!(*map.tempo_line().default_value(), Tempo::DEFAULT);
        assert_eq!(map.tempo_changes().len(), 2);
        assert_eq!(map.tempo_at(0), tempo(120_000));
        assert_eq!(map.tempo_at(199), tempo(120_000));
        assert_eq!(map.tempo_at(500), tempo(600_000));
        assert_eq!(map.time_signature_at(383), TimeSignature::DEFAULT);
        assert_eq!(map.time_signature_at(384), sig(3, 4));
    }

    #[test]
    fn map_edits() {
        let mut map = tpq_map(96);
        assert!(map.set_tempo(100, tempo(300_000)));
        assert!(!map.set_tempo(100, tempo(300_000)));
        assert!(map.set_time_signature(0, sig(7, 8)));
        assert_eq!(map.time_signature_changes().len(), 1);
        assert_eq!(map.time_signature_at(1000), sig(7, 8));
        map.clear_tempo();
        assert_eq!(map.tempo_at(100), Tempo::DEFAULT);
        map.clear_time_signature();
        assert_eq!(map.time_signature_at(0), TimeSignature::DEFAULT);
        assert_eq!(map, tpq_map(96));
    }
}

mod conversion {
    use super::*;
    use pretty_assertions::assert_eq;

    /// 96 ticks per quarter, 120 bpm up to tick 960 and 240 bpm after it.
    fn two_tempos() -> TempoMap {
        let mut map = tpq_map(96);
        map.set_tempo(960, tempo(250_000));
        map
    }

    #[test]
    fn metric_single_tempo() {
        let file = single_track_file(vec![meta(0, MetaMessage::Tempo(u24::new(120_000)))]);
        let map = TempoMap::from_file(&file);
        let span: MetricTimeSpan = time::convert_to(96, &map).unwrap();
        assert_eq!(span.total_micros(), 120_000);
        assert_eq!(time::convert_from(&span, &map).unwrap(), 96);
    }

    #[test]
    fn metric_across_tempo_changes() {
        let mut map = tpq_map(96);
        map.set_tempo(96, tempo(250_000));
        map.set_tempo(300, tempo(1_000_000));

        let span: MetricTimeSpan = time::convert_to(192, &map).unwrap();
        assert_eq!(span.total_micros(), 750_000);

        for &t in [0, 1, 50, 96, 97, 200, 299, 300, 301, 1000].iter() {
            let span: MetricTimeSpan = time::convert_to(t, &map).unwrap();
            assert_eq!(time::convert_from(&span, &map).unwrap(), t, "time {}", t);
            for &len in [0, 7, 100, 250].iter() {
                let span: MetricTimeSpan = time::convert_length_to(len, t, &map).unwrap();
                assert_eq!(
                    time::convert_length_from(&span, t, &map).unwrap(),
                    len,
                    "length {} at {}",
                    len,
                    t
                );
            }
        }
    }

    #[test]
    fn metric_fields() {
        let span = MetricTimeSpan::new(1, 2, 3, 456);
        assert_eq!(span.hours(), 1);
        assert_eq!(span.minutes(), 2);
        assert_eq!(span.seconds(), 3);
        assert_eq!(span.milliseconds(), 456);
        assert_eq!(span.to_string(), "1:02:03.456000");
        let dur = std::time::Duration::from(span);
        assert_eq!(MetricTimeSpan::from(dur), span);
    }

    #[test]
    fn musical() {
        let map = tpq_map(96);
        let eighth: MusicalTimeSpan = time::convert_to(48, &map).unwrap();
        assert_eq!(eighth, MusicalTimeSpan::EIGHTH);
        let span: MusicalTimeSpan = time::convert_to(144, &map).unwrap();
        assert_eq!((span.numerator(), span.denominator()), (3, 8));
        let zero: MusicalTimeSpan = time::convert_to(0, &map).unwrap();
        assert_eq!(zero, MusicalTimeSpan::default());

        let dotted = MusicalTimeSpan::QUARTER.dotted(1).unwrap();
        assert_eq!(time::convert_from(&dotted, &map).unwrap(), 144);
        let triplet = MusicalTimeSpan::QUARTER.triplet().unwrap();
        assert_eq!(time::convert_from(&triplet, &map).unwrap(), 64);
        assert_eq!(MusicalTimeSpan::new(6, 16).unwrap(), span);
        assert!(MusicalTimeSpan::new(1, 0)
            .unwrap_err()
            .is(err!(OutOfRange, "")));
        assert!(MusicalTimeSpan::EIGHTH < MusicalTimeSpan::QUARTER);
        assert_eq!(span.to_string(), "3/8");
    }

    #[test]
    fn bar_beat_ticks() {
        let mut map = tpq_map(96);
        map.set_time_signature(384, sig(3, 4));

        let span: BarBeatTicksTimeSpan = time::convert_to(778, &map).unwrap();
        assert_eq!(span, BarBeatTicksTimeSpan::new(2, 1, 10));
        assert_eq!(time::convert_from(&span, &map).unwrap(), 778);

        //One 4/4 bar and 16 ticks up to the change, nothing after it
        let span: BarBeatTicksTimeSpan = time::convert_length_to(400, 96, &map).unwrap();
        assert_eq!(span, BarBeatTicksTimeSpan::new(1, 0, 16));
        assert_eq!(time::convert_length_from(&span, 96, &map).unwrap(), 400);

        assert_eq!(
            time::convert_to::<BarBeatTicksTimeSpan>(0, &map).unwrap(),
            BarBeatTicksTimeSpan::default()
        );
        for t in (0..2000).step_by(37) {
            let span: BarBeatTicksTimeSpan = time::convert_to(t, &map).unwrap();
            assert_eq!(time::convert_from(&span, &map).unwrap(), t);
        }
    }

    #[test]
    fn bar_grid_restarts_at_signature_change() {
        let mut map = tpq_map(96);
        map.set_time_signature(400, sig(3, 4));

        //1 bar and 16 ticks of 4/4 before the change, 2 bars and 24 ticks of 3/4 after it
        let span: BarBeatTicksTimeSpan = time::convert_to(1000, &map).unwrap();
        assert_eq!(span, BarBeatTicksTimeSpan::new(3, 0, 40));
        assert_eq!(span.to_string(), "3.0.40");
        assert_eq!(time::convert_from(&span, &map).unwrap(), 1000);

        for start in &[0, 96] {
            for length in (1..2000).step_by(37) {
                let span: BarBeatTicksTimeSpan =
                    time::convert_length_to(length, *start, &map).unwrap();
                assert_eq!(
                    time::convert_length_from(&span, *start, &map).unwrap(),
                    length
                );
                let span: BarBeatFractionTimeSpan =
                    time::convert_length_to(length, *start, &map).unwrap();
                assert_eq!(
                    time::convert_length_from(&span, *start, &map).unwrap(),
                    length
                );
            }
        }

        //Leftover beats on both sides of a change complete a bar
        let mut map = tpq_map(96);
        map.set_time_signature(672, sig(3, 4));
        let span: BarBeatTicksTimeSpan = time::convert_to(1152, &map).unwrap();
        assert_eq!(span, BarBeatTicksTimeSpan::new(3, 1, 0));
        assert_eq!(time::convert_from(&span, &map).unwrap(), 1152);
    }

    #[test]
    fn bar_beat_fraction() {
        let mut map = tpq_map(96);
        map.set_time_signature(384, sig(3, 4));

        let span: BarBeatFractionTimeSpan = time::convert_to(778, &map).unwrap();
        assert_eq!(span.bars, 2);
        approx::assert_relative_eq!(span.beats, 1.0 + 10.0 / 96.0);
        assert_eq!(time::convert_from(&span, &map).unwrap(), 778);

        assert_eq!(
            time::convert_from(&BarBeatFractionTimeSpan::new(2, 1.5), &map).unwrap(),
            816
        );
        assert_eq!(
            time::convert_from(&BarBeatFractionTimeSpan::new(0, 2.25), &map).unwrap(),
            216
        );

        let mut map = tpq_map(96);
        map.set_time_signature(400, sig(3, 4));
        let span: BarBeatFractionTimeSpan = time::convert_to(1000, &map).unwrap();
        assert_eq!(span.bars, 3);
        approx::assert_relative_eq!(span.beats, 40.0 / 96.0);

        let negative = BarBeatFractionTimeSpan::new(1, -0.5);
        assert!(time::convert_from(&negative, &map)
            .unwrap_err()
            .is(err!(NegativeValue, "")));
    }

    #[test]
    fn math_subtract_measures_backward() {
        let map = two_tempos();

        let span = TimeSpan::Midi(MidiTimeSpan(1056))
            .subtract(
                MetricTimeSpan::from_micros(1_000_000).into(),
                TimeSpanMode::LengthLength,
            )
            .unwrap();
        assert_eq!(time::convert_length_from(&span, 0, &map).unwrap(), 816);

        let span = TimeSpan::Midi(MidiTimeSpan(1920))
            .subtract(
                MetricTimeSpan::from_micros(1_000_000).into(),
                TimeSpanMode::LengthLength,
            )
            .unwrap();
        assert_eq!(time::convert_length_from(&span, 0, &map).unwrap(), 1536);

        //As a time, the result is the same absolute tick
        let span = TimeSpan::Midi(MidiTimeSpan(1056))
            .subtract(
                MetricTimeSpan::from_micros(1_000_000).into(),
                TimeSpanMode::TimeLength,
            )
            .unwrap();
        assert_eq!(time::convert_from(&span, &map).unwrap(), 816);
    }

    #[test]
    fn math_add_and_times() {
        let map = two_tempos();

        let span = TimeSpan::Midi(MidiTimeSpan(864))
            .add(
                MetricTimeSpan::from_micros(1_000_000).into(),
                TimeSpanMode::LengthLength,
            )
            .unwrap();
        assert_eq!(time::convert_length_from(&span, 0, &map).unwrap(), 1152);

        let span = TimeSpan::Metric(MetricTimeSpan::from_micros(1_000_000))
            .subtract(MidiTimeSpan(96).into(), TimeSpanMode::TimeTime)
            .unwrap();
        assert_eq!(time::convert_from(&span, &map).unwrap(), 96);

        let err = TimeSpan::Midi(MidiTimeSpan(1))
            .add(MidiTimeSpan(2).into(), TimeSpanMode::TimeTime)
            .unwrap_err();
        assert!(err.is(err!(InvalidOperation, "")));
    }

    #[test]
    fn math_same_kind() {
        let sum = TimeSpan::Musical(MusicalTimeSpan::QUARTER)
            .add(MusicalTimeSpan::EIGHTH.into(), TimeSpanMode::LengthLength)
            .unwrap();
        assert_eq!(
            sum,
            TimeSpan::Musical(MusicalTimeSpan::new(3, 8).unwrap())
        );

        let err = TimeSpan::Midi(MidiTimeSpan(10))
            .subtract(MidiTimeSpan(20).into(), TimeSpanMode::LengthLength)
            .unwrap_err();
        assert!(err.is(err!(NegativeValue, "")));
    }

    #[test]
    fn math_negative_result() {
        let map = tpq_map(96);
        let span = TimeSpan::Midi(MidiTimeSpan(96))
            .subtract(
                MetricTimeSpan::from_micros(1_000_000).into(),
                TimeSpanMode::LengthLength,
            )
            .unwrap();
        let err = time::convert_length_from(&span, 0, &map).unwrap_err();
        assert!(err.is(err!(NegativeValue, "")));
    }

    #[test]
    fn unsupported_division() {
        let map = TempoMap::new(TimeDivision::Smpte(Fps::Fps25, 40));
        let err = time::convert_to::<MetricTimeSpan>(10, &map).unwrap_err();
        assert!(err.is(err!(UnsupportedTimeDivision, "")));
        let err = time::convert_from(&MusicalTimeSpan::QUARTER, &map).unwrap_err();
        assert!(err.is(err!(UnsupportedTimeDivision, "")));
    }
}
