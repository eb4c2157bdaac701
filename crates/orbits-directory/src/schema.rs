//! Queries against a container database.
//!
//! Only the fixed field set the sync engine needs is read: identifier, names,
//! organisation, phone numbers, email addresses and the thumbnail photo.

/// File name of a container database.
pub const DATABASE_FILE: &str = "AddressBook-v22.abcddb";

/// Columns: primary key, unique identifier, given name, family name,
/// organisation, thumbnail bytes.
///
/// The record table also stores groups (`<id>:ABGroup`); only people and
/// organisations are read.
pub const RECORDS: &str = "
SELECT Z_PK, ZUNIQUEID, ZFIRSTNAME, ZLASTNAME, ZORGANIZATION, ZTHUMBNAILIMAGEDATA
FROM ZABCDRECORD
WHERE ZUNIQUEID IS NOT NULL
  AND ZUNIQUEID NOT LIKE '%:ABGroup'
ORDER BY Z_PK
";

/// Columns: owning record, full number. In directory order.
pub const PHONE_NUMBERS: &str = "
SELECT ZOWNER, ZFULLNUMBER
FROM ZABCDPHONENUMBER
WHERE ZOWNER IS NOT NULL AND ZFULLNUMBER IS NOT NULL
ORDER BY ZOWNER, ZORDERINGINDEX, Z_PK
";

/// Columns: owning record, address. In directory order.
pub const EMAIL_ADDRESSES: &str = "
SELECT ZOWNER, ZADDRESS
FROM ZABCDEMAILADDRESS
WHERE ZOWNER IS NOT NULL AND ZADDRESS IS NOT NULL
ORDER BY ZOWNER, ZORDERINGINDEX, Z_PK
";
