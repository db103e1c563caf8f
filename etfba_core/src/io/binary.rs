//! Persisting a whole network as a compressed blob
//!
//! The blob is the network's JSON form behind a format version, gzip compressed. Derived
//! matrices aren't stored, they are rebuilt on first use after loading.
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metabolic_model::model::NetworkModel;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct BlobRef<'a> {
    format_version: u32,
    network: &'a NetworkModel,
}

#[derive(Deserialize)]
struct Blob {
    format_version: u32,
    network: NetworkModel,
}

impl NetworkModel {
    /// Write the network to `writer` as a compressed blob
    pub fn write_blob<W: Write>(&self, writer: W) -> Result<(), PersistError> {
        let mut encoder = GzEncoder::new(writer, Compression::best());
        let blob = BlobRef {
            format_version: FORMAT_VERSION,
            network: self,
        };
        serde_json::to_writer(&mut encoder, &blob).map_err(PersistError::Encode)?;
        encoder.finish()?;
        Ok(())
    }

    /// Read a network written by [`NetworkModel::write_blob`]
    pub fn read_blob<R: Read>(reader: R) -> Result<NetworkModel, PersistError> {
        let decoder = GzDecoder::new(BufReader::new(reader));
        let blob: Blob = serde_json::from_reader(decoder).map_err(PersistError::Decode)?;
        if blob.format_version != FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion(blob.format_version));
        }
        Ok(blob.network)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistError> {
        let mut bytes = Vec::new();
        self.write_blob(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<NetworkModel, PersistError> {
        NetworkModel::read_blob(bytes)
    }

    /// Save the network to `path`, replacing any existing file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_blob(&mut writer)?;
        writer.flush()?;
        debug!("Saved network to {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<NetworkModel, PersistError> {
        let path = path.as_ref();
        let network = NetworkModel::read_blob(File::open(path)?)?;
        debug!("Loaded network from {}", path.display());
        Ok(network)
    }
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unable to encode network: {0}")]
    Encode(serde_json::Error),
    /// Not a blob, or a corrupted one
    #[error("unable to decode network: {0}")]
    Decode(serde_json::Error),
    #[error("unsupported blob format version {0}")]
    UnsupportedVersion(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::reaction::ReactionBuilder;

    fn network() -> NetworkModel {
        let mut network = NetworkModel::new_empty();
        network.id = Some("chain".to_string());
        network.add_reaction(
            ReactionBuilder::default()
                .id("r1")
                .substrate_with_km("a", 1., Some(0.3))
                .product("b", 2.)
                .forward_kcat(Some(20.))
                .standard_gibbs_energy(Some(-3.5))
                .build()
                .unwrap(),
        );
        network.add_reaction(
            ReactionBuilder::default()
                .id("ex_a")
                .substrate("a.o", 1.)
                .product("a", 1.)
                .is_exchange(true)
                .build()
                .unwrap(),
        );
        network
    }

    #[test]
    fn bytes_round_trip() {
        let network = network();
        let restored = NetworkModel::from_bytes(&network.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.id, network.id);
        assert_eq!(restored.reactions(), network.reactions());
        assert_eq!(restored.metabolites(), network.metabolites());
        assert_eq!(
            restored.stoichiometric_matrix().to_dense(),
            network.stoichiometric_matrix().to_dense()
        );
        assert_eq!(restored.end_metabolites(), network.end_metabolites());
    }

    #[test]
    fn file_round_trip() {
        let network = network();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.bin");
        network.save(&path).unwrap();
        let restored = NetworkModel::load(&path).unwrap();
        assert_eq!(restored.reactions(), network.reactions());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            NetworkModel::from_bytes(b"not a blob"),
            Err(PersistError::Decode(_))
        ));
    }

    #[test]
    fn rejects_other_versions() {
        let network = network();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        let blob = BlobRef {
            format_version: 99,
            network: &network,
        };
        serde_json::to_writer(&mut encoder, &blob).unwrap();
        let bytes = encoder.finish().unwrap();
        assert!(matches!(
            NetworkModel::from_bytes(&bytes),
            Err(PersistError::UnsupportedVersion(99))
        ));
    }
}
