//! Saving networks to disk and reading them back
mod common;

use tempfile::tempdir;

use etfba_core::configuration::Configuration;
use etfba_core::io::binary::PersistError;
use etfba_core::metabolic_model::model::NetworkModel;

use common::toy_network;

#[test]
fn blob_preserves_the_network() {
    let network = toy_network();
    let dir = tempdir().unwrap();
    let path = dir.path().join("toy.etfba");
    network.save(&path).unwrap();
    let loaded = NetworkModel::load(&path).unwrap();

    assert_eq!(loaded.reactions().len(), 6);
    assert_eq!(loaded.stoichiometric_matrix(), network.stoichiometric_matrix());
    assert_eq!(loaded.end_metabolites(), network.end_metabolites());
    assert_eq!(loaded.km("hk", "atp_c").unwrap(), Some(0.5));
    assert_eq!(
        loaded.reaction("pgi").unwrap().standard_gibbs_energy,
        Some(2.5)
    );
    assert!(loaded.reaction("ex_glc").unwrap().is_exchange);
    assert!(loaded.reaction("biomass").unwrap().is_biomass_formation);
}

#[test]
fn rows_survive_a_json_round_trip() {
    let network = toy_network();
    let dir = tempdir().unwrap();
    let path = dir.path().join("rows.json");
    network.write_json(&path).unwrap();
    let reread = NetworkModel::read_json(&path, &Configuration::default()).unwrap();
    assert_eq!(reread.to_rows(), network.to_rows());
    assert_eq!(reread.total_stoichiometric_matrix(), network.total_stoichiometric_matrix());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        NetworkModel::load(dir.path().join("absent.etfba")),
        Err(PersistError::Io(_))
    ));
}
