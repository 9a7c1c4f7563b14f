pub mod bucket_page;
pub mod codec;
pub mod directory_page;
pub mod error;
pub mod table;

pub use bucket_page::HashTableBucketPage;
pub use codec::Storable;
pub use directory_page::HashTableDirectoryPage;
pub use error::HashTableError;
pub use table::ExtendibleHashTable;
