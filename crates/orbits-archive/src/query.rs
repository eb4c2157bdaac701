//! SQL run against the archive.
//!
//! A message counts as unread when it is inbound and either carries an
//! explicit unread marker, or is newer than the conversation's last-read
//! watermark. Either signal alone under-reports on some archive versions, so
//! both are checked.

/// One row per conversation that has at least one message.
///
/// Columns: guid, display_name, participants (comma-joined), participant
/// count, last message date, unread message count.
pub const CONVERSATION_STATS: &str = "
WITH chat_activity AS (
    SELECT
        c.ROWID        AS chat_rowid,
        c.guid         AS chat_guid,
        c.display_name AS display_name,
        MAX(m.date)    AS last_message_date,
        SUM(CASE
            WHEN m.is_from_me = 0 AND m.is_read = 0 THEN 1
            WHEN m.is_from_me = 0
                 AND COALESCE(c.last_read_message_timestamp, 0) > 0
                 AND m.date > c.last_read_message_timestamp THEN 1
            ELSE 0
        END)           AS unread_count
    FROM chat c
    JOIN chat_message_join cmj ON cmj.chat_id = c.ROWID
    JOIN message m             ON m.ROWID     = cmj.message_id
    GROUP BY c.ROWID, c.guid, c.display_name
)
SELECT
    ca.chat_guid,
    ca.display_name,
    GROUP_CONCAT(DISTINCT h.id) AS participants,
    COUNT(DISTINCT h.id)        AS participant_count,
    ca.last_message_date,
    ca.unread_count
FROM chat_activity ca
LEFT JOIN chat_handle_join chj ON chj.chat_id = ca.chat_rowid
LEFT JOIN handle h             ON h.ROWID     = chj.handle_id
GROUP BY ca.chat_rowid, ca.chat_guid, ca.display_name,
         ca.last_message_date, ca.unread_count
HAVING ca.last_message_date IS NOT NULL
ORDER BY ca.last_message_date DESC
";

/// One row per raw handle that appears in a one-to-one conversation.
///
/// Columns: handle, unread message count, last message date, whether the
/// latest message was sent by the user, and the GUID of the conversation
/// holding that latest message. Messages are ranked newest-first per handle
/// in a single window pass; rank 1 is the latest.
pub const HANDLE_STATS: &str = "
WITH direct_chat AS (
    SELECT chat_id
    FROM chat_handle_join
    GROUP BY chat_id
    HAVING COUNT(*) = 1
),
direct_message AS (
    SELECT
        m.handle_id,
        m.date,
        m.is_read,
        m.is_from_me,
        c.guid                                     AS chat_guid,
        COALESCE(c.last_read_message_timestamp, 0) AS last_read,
        ROW_NUMBER() OVER (
            PARTITION BY m.handle_id
            ORDER BY m.date DESC, m.ROWID DESC
        )                                          AS recency
    FROM message m
    JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
    JOIN direct_chat dc        ON dc.chat_id     = cmj.chat_id
    JOIN chat c                ON c.ROWID        = cmj.chat_id
    WHERE m.handle_id != 0
)
SELECT
    h.id AS handle,
    SUM(CASE
        WHEN dm.is_from_me = 0 AND dm.is_read = 0 THEN 1
        WHEN dm.is_from_me = 0 AND dm.last_read > 0
             AND dm.date > dm.last_read THEN 1
        ELSE 0
    END)                                               AS unread_count,
    MAX(dm.date)                                       AS last_message_date,
    MAX(CASE WHEN dm.recency = 1 THEN dm.is_from_me END) AS last_is_from_me,
    MAX(CASE WHEN dm.recency = 1 THEN dm.chat_guid END)  AS chat_guid
FROM handle h
JOIN direct_message dm ON dm.handle_id = h.ROWID
GROUP BY h.ROWID, h.id
HAVING MAX(dm.date) IS NOT NULL
ORDER BY last_message_date DESC
";
