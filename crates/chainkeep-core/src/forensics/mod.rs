/// Content hashing and acquisition sidecars
pub mod hash;
pub mod sidecar;

pub use hash::{
    hash_bytes, hash_file, hash_file_with, HashAlgorithm, HashOptions, DEFAULT_CHUNK_SIZE,
};

pub use sidecar::{
    check_sidecars, check_sidecars_in_dir, find_hash_sidecar, is_artifact, is_sidecar,
    read_hash_sidecar, sidecar_path, sidecar_suffixes, write_hash_sidecar, write_metadata_sidecar,
    AcquisitionMetadata, ArtifactError, CheckStatus, DirectoryCheck, HashSidecar, SidecarReport,
    ARTIFACT_EXTENSIONS,
};
