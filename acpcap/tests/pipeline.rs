//! End-to-end runs over synthetic captures.

use std::fs;
use std::path::{Path, PathBuf};

use acpcap::artifact::{
    decode_file, write_artifacts, ArtifactName, DecodeOutcome, DEFAULT_PREVIEW_BYTES,
};
use acpcap::commands::{run_decode, run_extract};
use acpcap::config::Settings;
use acpcap::error::AppError;
use acpcap::{ArtifactDecoder, ArtifactError, HeaderMode, Inspector, SequencedMessage};
use acpcap_protocol::{
    AdminSendAdminGetServerVersion, CharacterCharacterDelete, CharacterIdentity, ChatMessageType,
    CommunicationHearSpeech, Direction, EffectsSoundEvent, FragmentHeader, GameAction, GameEvent,
    ItemDeleteObject, ItemServerSaysRemove, LoginEnterGameServerReady, LoginLogOffCharacter,
    LoginLoginCharacterSet, LoginSendEnterWorldRequest, Message, MessageRegistry,
    OrderedGameAction, OrderedGameEvent, OrderedIdentifiers, PacketHeaderFlags,
    QualitiesUpdateInt, Sound, WeenieError, FRAGMENT_CHUNK_SIZE,
};
use bytes::{BufMut, Bytes, BytesMut};

const CLIENT: [u8; 4] = [127, 0, 0, 1];
const SERVER: [u8; 4] = [198, 51, 100, 7];

/// One blob fragment chunk.
struct Chunk<'a> {
    sequence: u32,
    count: u16,
    index: u16,
    data: &'a [u8],
}

fn whole(sequence: u32, data: &[u8]) -> Chunk<'_> {
    Chunk {
        sequence,
        count: 1,
        index: 0,
        data,
    }
}

/// Transport packet carrying the given chunks.
fn ac_packet(sequence: u32, chunks: &[Chunk<'_>]) -> Vec<u8> {
    let mut body = BytesMut::new();
    for chunk in chunks {
        body.put_u32_le(chunk.sequence);
        body.put_u32_le(0x8000_0000 | chunk.sequence);
        body.put_u16_le(chunk.count);
        body.put_u16_le((FragmentHeader::SIZE + chunk.data.len()) as u16);
        body.put_u16_le(chunk.index);
        body.put_u16_le(5);
        body.put_slice(chunk.data);
    }

    let mut buf = BytesMut::new();
    buf.put_u32_le(sequence);
    buf.put_u32_le(PacketHeaderFlags::BLOB_FRAGMENTS.bits());
    buf.put_u32_le(0);
    buf.put_u16_le(0x000B);
    buf.put_u16_le(0);
    buf.put_u16_le(body.len() as u16);
    buf.put_u16_le(0);
    buf.put_slice(&body);
    buf.to_vec()
}

/// Ethernet + IPv4 + UDP frame.
fn frame(source: [u8; 4], destination: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01, 0x02, 0, 0, 0, 0, 0x02]);
    frame.extend_from_slice(&[0x08, 0x00]);
    frame.push(0x45);
    frame.push(0);
    frame.extend_from_slice(&((20 + 8 + payload.len()) as u16).to_be_bytes());
    frame.extend_from_slice(&[0, 1, 0x40, 0, 64, 17, 0, 0]);
    frame.extend_from_slice(&source);
    frame.extend_from_slice(&destination);
    frame.extend_from_slice(&9000u16.to_be_bytes());
    frame.extend_from_slice(&9000u16.to_be_bytes());
    frame.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(payload);
    frame
}

fn pcap_file(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut file = Vec::new();
    file.extend_from_slice(&0xA1B2_C3D4u32.to_le_bytes());
    file.extend_from_slice(&2u16.to_le_bytes());
    file.extend_from_slice(&4u16.to_le_bytes());
    file.extend_from_slice(&0i32.to_le_bytes());
    file.extend_from_slice(&0u32.to_le_bytes());
    file.extend_from_slice(&65535u32.to_le_bytes());
    file.extend_from_slice(&1u32.to_le_bytes());
    for (i, frame) in frames.iter().enumerate() {
        file.extend_from_slice(&(1_700_000_000 + i as u32).to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes());
        file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        file.extend_from_slice(frame);
    }
    file
}

fn pcapng_file(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut file = Vec::new();
    // Section header block.
    file.extend_from_slice(&0x0A0D_0D0Au32.to_le_bytes());
    file.extend_from_slice(&28u32.to_le_bytes());
    file.extend_from_slice(&0x1A2B_3C4Du32.to_le_bytes());
    file.extend_from_slice(&1u16.to_le_bytes());
    file.extend_from_slice(&0u16.to_le_bytes());
    file.extend_from_slice(&(-1i64).to_le_bytes());
    file.extend_from_slice(&28u32.to_le_bytes());
    // Interface description block, Ethernet.
    file.extend_from_slice(&1u32.to_le_bytes());
    file.extend_from_slice(&20u32.to_le_bytes());
    file.extend_from_slice(&1u16.to_le_bytes());
    file.extend_from_slice(&0u16.to_le_bytes());
    file.extend_from_slice(&65535u32.to_le_bytes());
    file.extend_from_slice(&20u32.to_le_bytes());
    for frame in frames {
        let padded = (frame.len() + 3) / 4 * 4;
        let total = (32 + padded) as u32;
        file.extend_from_slice(&6u32.to_le_bytes());
        file.extend_from_slice(&total.to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes());
        file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        file.extend_from_slice(frame);
        file.resize(file.len() + padded - frame.len(), 0);
        file.extend_from_slice(&total.to_le_bytes());
    }
    file
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

fn write_capture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

/// A conversation with an interleaved two-chunk message and one unrelated frame.
fn session() -> Vec<Vec<u8>> {
    let remove = ItemServerSaysRemove {
        object_id: 0x5000_0001,
    }
    .to_bytes();
    let talk = OrderedGameAction {
        sequence: 1,
        action: GameAction::Talk {
            message: "hello".into(),
        },
    }
    .to_bytes();
    let speech = CommunicationHearSpeech {
        message: "x".repeat(600),
        sender_name: "Town Crier".into(),
        sender_id: 0x5000_0002,
        chat_type: ChatMessageType::Speech,
    }
    .to_bytes();
    assert!(speech.len() > FRAGMENT_CHUNK_SIZE);
    let enter = LoginSendEnterWorldRequest.to_bytes();
    let popup = OrderedGameEvent {
        object_id: 0x5000_0001,
        sequence: 2,
        event: GameEvent::PopUpString {
            message: "Welcome".into(),
        },
    }
    .to_bytes();
    let unknown_event = OrderedGameEvent {
        object_id: 0x5000_0001,
        sequence: 3,
        event: GameEvent::Unknown {
            event_type: 0x9999,
            body: Bytes::from_static(&[1, 2, 3]),
        },
    }
    .to_bytes();

    vec![
        frame(SERVER, CLIENT, &ac_packet(1, &[whole(10, &remove)])),
        frame(CLIENT, SERVER, &ac_packet(1, &[whole(20, &talk)])),
        frame([10, 0, 0, 1], [10, 0, 0, 2], &ac_packet(1, &[whole(99, &remove)])),
        frame(
            SERVER,
            CLIENT,
            &ac_packet(
                2,
                &[Chunk {
                    sequence: 11,
                    count: 2,
                    index: 0,
                    data: &speech[..FRAGMENT_CHUNK_SIZE],
                }],
            ),
        ),
        frame(CLIENT, SERVER, &ac_packet(2, &[whole(21, &enter)])),
        frame(
            SERVER,
            CLIENT,
            &ac_packet(
                3,
                &[Chunk {
                    sequence: 11,
                    count: 2,
                    index: 1,
                    data: &speech[FRAGMENT_CHUNK_SIZE..],
                }],
            ),
        ),
        frame(
            SERVER,
            CLIENT,
            &ac_packet(4, &[whole(12, &popup), whole(13, &unknown_event)]),
        ),
    ]
}

#[test]
fn test_capture_to_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let capture = write_capture(dir.path(), "session.pcap", &pcap_file(&session()));

    let summary = run_extract(&capture, out.path(), &Settings::default()).unwrap();
    assert_eq!(summary.stats.frames, 7);
    assert_eq!(summary.stats.dropped, 1);
    assert_eq!(summary.stats.client_payloads, 2);
    assert_eq!(summary.stats.server_payloads, 4);

    assert_eq!(
        file_names(&summary.written),
        vec![
            "0000_ServerToClient_0x0024_0x0024_Item_ServerSaysRemove.bin",
            "0001_ClientToServer_0xF7B1_0x0015_Communication_Talk.bin",
            "0002_ClientToServer_0xF7C8_0xF7C8_Login_SendEnterWorldRequest.bin",
            "0003_ServerToClient_0x02BB_0x02BB_Communication_HearSpeech.bin",
            "0004_ServerToClient_0xF7B0_0x0004_Communication_PopUpString.bin",
            "0005_ServerToClient_0xF7B0_0xF7B0_Ordered_GameEvent.bin",
        ]
    );

    for (i, path) in summary.written.iter().enumerate() {
        let name = ArtifactName::from_path(path).unwrap();
        assert_eq!(name.index, i);
    }
}

#[test]
fn test_artifacts_decode_and_reencode() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let capture = write_capture(dir.path(), "session.pcap", &pcap_file(&session()));
    let summary = run_extract(&capture, out.path(), &Settings::default()).unwrap();
    let registry = MessageRegistry::builtin().unwrap();

    for path in &summary.written {
        let bytes = fs::read(path).unwrap();
        let name = ArtifactName::from_path(path).unwrap();

        let report = decode_file(path, &registry).unwrap();
        match &report.outcome {
            DecodeOutcome::Decoded { opcode, .. } => assert_eq!(*opcode, name.opcode),
            other => panic!("{}: {:?}", path.display(), other),
        }

        let message = registry
            .decode_message(name.direction, Bytes::from(bytes.clone()))
            .unwrap();
        assert_eq!(message.to_bytes(), Bytes::from(bytes));
    }
}

#[test]
fn test_decoded_text_of_ordered_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let capture = write_capture(dir.path(), "session.pcap", &pcap_file(&session()));
    let summary = run_extract(&capture, out.path(), &Settings::default()).unwrap();

    let report = run_decode(&summary.written[1], &Settings::default()).unwrap();
    let text = report.to_string();
    assert!(text.contains("Index: 0001\n"));
    assert!(text.contains("Direction: ClientToServer\n"));
    assert!(text.contains("OpCode: 0xF7B1\n"));
    assert!(text.contains("Message ID: 0x0015\n"));
    assert!(text.contains("Message Name: Communication_Talk\n"));
    assert!(text.contains("Message OpCode: 0xF7B1\n"));
    assert!(text.contains("  Action:\n    Message: hello\n"));

    let report = run_decode(&summary.written[3], &Settings::default()).unwrap();
    let text = report.to_string();
    assert!(text.contains("  SenderName: Town Crier\n"));
    assert!(text.contains("  Type: Speech (0x2)\n"));
}

#[test]
fn test_truncated_capture_keeps_complete_frames() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    // The capture was cut off in the middle of its last record.
    let mut data = pcap_file(&session());
    data.truncate(data.len() - 5);
    let capture = write_capture(dir.path(), "cut.pcap", &data);

    let summary = run_extract(&capture, out.path(), &Settings::default()).unwrap();
    assert_eq!(summary.stats.frames, 6);
    assert_eq!(summary.stats.dropped, 1);
    assert_eq!(summary.incomplete_fragments, 0);
    assert_eq!(
        file_names(&summary.written),
        vec![
            "0000_ServerToClient_0x0024_0x0024_Item_ServerSaysRemove.bin",
            "0001_ClientToServer_0xF7B1_0x0015_Communication_Talk.bin",
            "0002_ClientToServer_0xF7C8_0xF7C8_Login_SendEnterWorldRequest.bin",
            "0003_ServerToClient_0x02BB_0x02BB_Communication_HearSpeech.bin",
        ]
    );
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 4);
}

/// One value of every decodable message type, ordered wrappers once per inner kind.
fn catalog() -> Vec<Box<dyn Message>> {
    vec![
        Box::new(ItemServerSaysRemove {
            object_id: 0x5000_0001,
        }),
        Box::new(CommunicationHearSpeech {
            message: "hello there".into(),
            sender_name: "Town Crier".into(),
            sender_id: 0x8000_1234,
            chat_type: ChatMessageType::Speech,
        }),
        Box::new(QualitiesUpdateInt {
            sequence: 3,
            object_id: 0x5000_0001,
            key: 25,
            value: -12,
        }),
        Box::new(LoginLogOffCharacter { character_id: 42 }),
        Box::new(CharacterCharacterDelete {
            account: "acct".into(),
            slot: 2,
        }),
        Box::new(LoginLoginCharacterSet {
            status: 0,
            characters: vec![CharacterIdentity {
                character_id: 0x5000_000A,
                name: "Aerfalle".into(),
                seconds_greyed_out: 0,
            }],
            deleted_characters: vec![CharacterIdentity {
                character_id: 0x5000_000C,
                name: "Gone".into(),
                seconds_greyed_out: 3600,
            }],
            allowed_slots: 11,
            account: "tester".into(),
            use_turbine_chat: true,
            has_throne_of_destiny: false,
        }),
        Box::new(ItemDeleteObject {
            object_id: 99,
            instance_sequence: 0xBEEF,
        }),
        Box::new(EffectsSoundEvent {
            object_id: 0x5000_0001,
            sound: Sound::Attack1,
            volume: 0.5,
        }),
        Box::new(OrderedGameEvent {
            object_id: 0x5000_0001,
            sequence: 1,
            event: GameEvent::PopUpString {
                message: "Welcome".into(),
            },
        }),
        Box::new(OrderedGameEvent {
            object_id: 0x5000_0001,
            sequence: 2,
            event: GameEvent::UseDone {
                failure: WeenieError::BadParam,
            },
        }),
        Box::new(OrderedGameEvent {
            object_id: 0x5000_0001,
            sequence: 3,
            event: GameEvent::Unknown {
                event_type: 0x9999,
                body: Bytes::from_static(&[1, 2, 3, 4]),
            },
        }),
        Box::new(OrderedGameAction {
            sequence: 1,
            action: GameAction::Talk {
                message: "hi".into(),
            },
        }),
        Box::new(OrderedGameAction {
            sequence: 2,
            action: GameAction::SetAfkMode { afk: true },
        }),
        Box::new(LoginSendEnterWorldRequest),
        Box::new(AdminSendAdminGetServerVersion),
        Box::new(LoginEnterGameServerReady),
    ]
}

#[test]
fn test_every_message_type_round_trips_through_artifacts() {
    let registry = MessageRegistry::builtin().unwrap();
    let samples = catalog();

    let mut decodable: Vec<&str> = registry
        .kinds()
        .filter(|kind| kind.decode.is_some())
        .map(|kind| kind.name)
        .collect();
    decodable.sort_unstable();
    let mut covered: Vec<&str> = samples
        .iter()
        .map(|m| registry.kind_for(m.direction(), m.opcode()).unwrap().name)
        .collect();
    covered.sort_unstable();
    covered.dedup();
    assert_eq!(covered, decodable);

    let messages: Vec<SequencedMessage> = samples
        .into_iter()
        .enumerate()
        .map(|(index, message)| SequencedMessage {
            index,
            direction: message.direction(),
            message,
        })
        .collect();
    let out = tempfile::tempdir().unwrap();
    let written = write_artifacts(&messages, out.path(), &OrderedIdentifiers::default()).unwrap();
    assert_eq!(written.len(), messages.len());

    let decoder = ArtifactDecoder::new(&registry, Inspector::default(), DEFAULT_PREVIEW_BYTES);
    for (path, original) in written.iter().zip(&messages) {
        let bytes = fs::read(path).unwrap();
        assert_eq!(Bytes::from(bytes.clone()), original.message.to_bytes());

        let report = decoder.decode_file(path).unwrap();
        assert!(
            matches!(report.outcome, DecodeOutcome::Decoded { opcode, .. } if opcode == original.message.opcode()),
            "{}",
            report
        );

        let name = ArtifactName::from_path(path).unwrap();
        let decoded = decoder.read_message(name.opcode, &name.type_name, &bytes).unwrap();
        assert_eq!(decoded.to_bytes(), Bytes::from(bytes), "{}", path.display());
    }
}

#[test]
fn test_pcapng_capture() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let capture = write_capture(dir.path(), "session.pcapng", &pcapng_file(&session()));

    let summary = run_extract(&capture, out.path(), &Settings::default()).unwrap();
    assert_eq!(summary.stats.frames, 7);
    assert_eq!(summary.written.len(), 6);
}

#[test]
fn test_other_local_address() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let capture = write_capture(dir.path(), "session.pcap", &pcap_file(&session()));

    // Seen from the server, every direction flips and no opcode is registered
    // for the flipped direction.
    let settings = Settings {
        local_address: SERVER.into(),
        header_mode: HeaderMode::Parsed,
        ..Settings::default()
    };
    let summary = run_extract(&capture, out.path(), &settings).unwrap();
    assert_eq!(summary.stats.client_payloads, 4);
    assert_eq!(summary.stats.server_payloads, 2);

    let names = file_names(&summary.written);
    assert_eq!(names.len(), 6);
    assert_eq!(names[0], "0000_ClientToServer_0x0024_0x0024_UnknownMessage.bin");
    assert_eq!(names[1], "0001_ServerToClient_0xF7B1_0xF7B1_UnknownMessage.bin");
}

#[test]
fn test_missing_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let capture = write_capture(dir.path(), "session.pcap", &pcap_file(&session()));
    let missing = dir.path().join("out");

    let err = run_extract(&capture, &missing, &Settings::default()).unwrap_err();
    assert!(matches!(
        err,
        AppError::Artifact(ArtifactError::OutputDirNotFound(_))
    ));
    assert!(!missing.exists());
}

#[test]
fn test_garbage_capture() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let capture = write_capture(dir.path(), "noise.pcap", &[0x55; 100]);
    assert!(matches!(
        run_extract(&capture, out.path(), &Settings::default()),
        Err(AppError::Capture(_))
    ));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn test_direction_tokens() {
    assert_eq!(Direction::ClientToServer.to_string(), "ClientToServer");
    assert_eq!(Direction::ServerToClient.to_string(), "ServerToClient");
}
