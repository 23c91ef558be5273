use std::fs;
use std::path::{Path, PathBuf};

use acpcap_protocol::OrderedIdentifiers;
use log::{debug, info};

use super::naming::ArtifactName;
use super::ArtifactError;
use crate::collect::SequencedMessage;

/// Write one `.bin` file per message into `output_dir`.
///
/// The directory must already exist; nothing is written otherwise. Each file
/// holds the message exactly as it re-encodes, opcode included.
pub fn write_artifacts(
    messages: &[SequencedMessage],
    output_dir: &Path,
    ids: &OrderedIdentifiers,
) -> Result<Vec<PathBuf>, ArtifactError> {
    if !output_dir.is_dir() {
        return Err(ArtifactError::OutputDirNotFound(output_dir.to_path_buf()));
    }

    let mut written = Vec::with_capacity(messages.len());
    for sequenced in messages {
        let message = &sequenced.message;
        let name = ArtifactName::new(
            sequenced.index,
            sequenced.direction,
            message.opcode(),
            message.type_name(),
            ids,
        );
        let path = output_dir.join(name.file_name());
        let data = message.to_bytes();
        fs::write(&path, &data).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("{} bytes", data.len());
        info!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acpcap_protocol::{
        Direction, GameAction, ItemServerSaysRemove, Message, OrderedGameAction,
    };

    fn sequenced(index: usize, direction: Direction, message: Box<dyn Message>) -> SequencedMessage {
        SequencedMessage {
            index,
            direction,
            message,
        }
    }

    #[test]
    fn test_writes_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![
            sequenced(
                0,
                Direction::ServerToClient,
                Box::new(ItemServerSaysRemove { object_id: 9 }),
            ),
            sequenced(
                1,
                Direction::ClientToServer,
                Box::new(OrderedGameAction {
                    sequence: 1,
                    action: GameAction::Talk {
                        message: "hi".into(),
                    },
                }),
            ),
        ];

        let written = write_artifacts(&messages, dir.path(), &OrderedIdentifiers::default()).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "0000_ServerToClient_0x0024_0x0024_Item_ServerSaysRemove.bin",
                "0001_ClientToServer_0xF7B1_0x0015_Communication_Talk.bin",
            ]
        );
        assert_eq!(fs::read(&written[0]).unwrap(), messages[0].message.to_bytes());
    }

    #[test]
    fn test_missing_directory_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let messages = vec![sequenced(
            0,
            Direction::ServerToClient,
            Box::new(ItemServerSaysRemove { object_id: 1 }),
        )];
        let err = write_artifacts(&messages, &missing, &OrderedIdentifiers::default()).unwrap_err();
        assert!(matches!(err, ArtifactError::OutputDirNotFound(p) if p == missing));
        assert!(!missing.exists());
    }
}
