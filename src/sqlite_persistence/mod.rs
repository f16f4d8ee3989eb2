mod versioned_schema;

pub use versioned_schema::{
    read_schema_version, table_exists, write_schema_version, Column, ForeignKey,
    ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
};
