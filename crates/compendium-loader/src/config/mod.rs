pub mod loader;
pub mod schema;

pub use loader::{
    apply_env_overrides, default_config_path, load_config, load_config_from_str, validate_config,
};
pub use schema::{
    BagitConfig, BrokerConfig, CompendiumConfig, ContainerConfig, EncodingConfig, ExtractConfig,
    LoaderConfig, MappingConfig, MetadataConfig, SourcesConfig, WebdavConfig, ZenodoConfig,
};
