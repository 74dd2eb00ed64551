// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsing tests.

use calsync_caldav::{CalDavError, Href, MultiStatusResponse};
use jiff::Timestamp;

#[test]
fn response_parse_simple_namespace_test() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<D:multistatus xmlns:D=\"DAV:\">
  <D:response>
    <D:href>/test/</D:href>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    assert_eq!(response.responses.len(), 1);
    assert_eq!(response.responses[0].href.as_str(), "/test/");
    assert!(response.sync_token.is_none());
}

#[test]
fn response_parse_rejects_other_documents() {
    let err = MultiStatusResponse::from_xml("<D:error xmlns:D=\"DAV:\"/>").unwrap_err();
    assert!(matches!(err, CalDavError::InvalidResponse(_)));

    let err = MultiStatusResponse::from_xml("<D:multistatus xmlns:D=\"DAV:\"><D:response>")
        .unwrap_err();
    assert!(matches!(err, CalDavError::Xml(_)), "{err:?}");
}

#[test]
fn response_parse_multistatus_basic() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<D:multistatus xmlns:D=\"DAV:\">
  <D:response>
    <D:href>/calendars/user/event1.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>\"12345\"</D:getetag>
        <D:getlastmodified>Mon, 02 Oct 2023 10:00:00 GMT</D:getlastmodified>
        <D:getcontentlength>42</D:getcontentlength>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");

    assert_eq!(response.responses.len(), 1);
    let item = &response.responses[0];
    assert_eq!(item.href.as_str(), "/calendars/user/event1.ics");
    assert_eq!(item.prop_stats.len(), 1);
    assert_eq!(item.prop_stats[0].status, "HTTP/1.1 200 OK");
    assert_eq!(
        item.prop_stats[0].props.get_etag.as_ref().unwrap().as_str(),
        "12345"
    );

    let object = item
        .to_calendar_object(item.path().unwrap().clone())
        .expect("Failed to decode object");
    assert_eq!(
        object.last_modified,
        Some("2023-10-02T10:00:00Z".parse::<Timestamp>().unwrap())
    );
    assert_eq!(object.content_length, Some(42));
    assert!(!object.has_data());
}

#[test]
fn response_parse_absolute_href() {
    let xml = "\
<D:multistatus xmlns:D=\"DAV:\">
  <D:response>
    <D:href>https://caldav.example.com/calendars/user/event1.ics</D:href>
    <D:status>HTTP/1.1 404 Not Found</D:status>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let item = &response.responses[0];
    assert_eq!(item.href.as_str(), "/calendars/user/event1.ics");
    assert!(item.is_not_found());
    assert!(matches!(item.path(), Err(CalDavError::NotFound(href)) if href == item.href));
}

#[test]
fn response_parse_calendar_collection() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<D:multistatus xmlns:D=\"DAV:\" xmlns:C=\"urn:ietf:params:xml:ns:caldav\"
    xmlns:I=\"http://apple.com/ns/ical/\" xmlns:CS=\"http://calendarserver.org/ns/\">
  <D:response>
    <D:href>/calendars/user/personal/</D:href>
    <D:propstat>
      <D:prop>
        <D:displayname>Personal Calendar</D:displayname>
        <D:resourcetype>
          <D:collection/>
          <C:calendar/>
        </D:resourcetype>
        <C:supported-calendar-component-set>
          <C:comp name=\"VEVENT\"/>
          <C:comp name=\"VTODO\"/>
        </C:supported-calendar-component-set>
        <C:max-resource-size>102400</C:max-resource-size>
        <I:calendar-color>#0E61B9FF</I:calendar-color>
        <D:sync-token>http://example.com/sync/1</D:sync-token>
        <D:current-user-privilege-set>
          <D:privilege><D:read/></D:privilege>
          <D:privilege><D:write/></D:privilege>
        </D:current-user-privilege-set>
        <CS:getctag>\"ctag-1\"</CS:getctag>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
      <D:prop>
        <C:calendar-description/>
      </D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let item = &response.responses[0];
    let calendar = item
        .to_calendar_collection(item.href.clone())
        .expect("Failed to decode collection")
        .expect("Not a calendar");

    assert_eq!(calendar.href.as_str(), "/calendars/user/personal/");
    assert_eq!(calendar.display_name.as_deref(), Some("Personal Calendar"));
    assert_eq!(calendar.description, None);
    assert_eq!(calendar.supported_components, vec!["VEVENT", "VTODO"]);
    assert_eq!(calendar.max_resource_size, Some(102_400));
    assert_eq!(calendar.color.as_deref(), Some("#0E61B9FF"));
    assert_eq!(calendar.sync_token.as_deref(), Some("http://example.com/sync/1"));
    assert_eq!(calendar.current_user_privileges, vec!["read", "write"]);
    assert_eq!(calendar.ctag.as_ref().map(|c| c.as_str()), Some("ctag-1"));
}

#[test]
fn response_non_calendar_collection_is_skipped() {
    let xml = "\
<D:multistatus xmlns:D=\"DAV:\">
  <D:response>
    <D:href>/calendars/user/inbox/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/></D:resourcetype>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let item = &response.responses[0];
    assert_eq!(item.to_calendar_collection(item.href.clone()).unwrap(), None);
}

#[test]
fn response_negative_max_resource_size_is_rejected() {
    let xml = "\
<D:multistatus xmlns:D=\"DAV:\" xmlns:C=\"urn:ietf:params:xml:ns:caldav\">
  <D:response>
    <D:href>/calendars/user/personal/</D:href>
    <D:propstat>
      <D:prop>
        <C:max-resource-size>-1</C:max-resource-size>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let item = &response.responses[0];
    let err = item.to_calendar_collection(item.href.clone()).unwrap_err();
    assert!(matches!(err, CalDavError::InvalidResponse(_)));
}

#[test]
fn response_parse_multiple_propstats() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<D:multistatus xmlns:D=\"DAV:\">
  <D:response>
    <D:href>/calendars/user/event1.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:displayname>Event 1</D:displayname>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
      <D:prop>
        <D:getetag>\"12345\"</D:getetag>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");

    assert_eq!(response.responses.len(), 1);
    assert_eq!(response.responses[0].prop_stats.len(), 2);
    let props = response.responses[0].props();
    assert_eq!(props.display_name.as_deref(), Some("Event 1"));
    assert_eq!(props.get_etag.as_ref().unwrap().as_str(), "12345");
}

#[test]
fn response_parse_calendar_data() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<D:multistatus xmlns:D=\"DAV:\" xmlns:C=\"urn:ietf:params:xml:ns:caldav\">
  <D:response>
    <D:href>/calendars/user/event1.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>\"12345\"</D:getetag>
        <C:calendar-data>\
BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Example Corp.//CalDAV Client//EN\r\n\
BEGIN:VEVENT\r\n\
UID:1@example.com\r\n\
SUMMARY:Test &amp; Event\r\n\
DTSTART:20250101T120000Z\r\n\
DTEND:20250101T130000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n\
</C:calendar-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");

    assert_eq!(response.responses.len(), 1);
    let calendar_data = response.responses[0]
        .props()
        .calendar_data
        .expect("Missing calendar data");
    assert!(calendar_data.starts_with("BEGIN:VCALENDAR"));
    assert!(calendar_data.contains("SUMMARY:Test & Event"));
}

#[test]
fn response_parse_calendar_home_set() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<D:multistatus xmlns:D=\"DAV:\" xmlns:C=\"urn:ietf:params:xml:ns:caldav\">
  <D:response>
    <D:href>/dav/principals/user/</D:href>
    <D:propstat>
      <D:prop>
        <C:calendar-home-set>
          <D:href>/dav/calendars/user/</D:href>
        </C:calendar-home-set>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");

    let calendar_home = response.responses[0]
        .props()
        .calendar_home_set
        .expect("Missing calendar home set");
    assert_eq!(calendar_home, Href::from("/dav/calendars/user/"));
}

#[test]
fn response_parse_unauthenticated_principal() {
    let xml = "\
<D:multistatus xmlns:D=\"DAV:\">
  <D:response>
    <D:href>/</D:href>
    <D:propstat>
      <D:prop>
        <D:current-user-principal><D:unauthenticated/></D:current-user-principal>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    let props = response.responses[0].props();
    assert!(props.unauthenticated);
    assert!(props.current_user_principal.is_none());
}

#[test]
fn response_parse_with_error_status() {
    let xml = "\
<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<D:multistatus xmlns:D=\"DAV:\">
  <D:response>
    <D:href>/calendars/user/event1.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>\"12345\"</D:getetag>
      </D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");

    assert_eq!(response.responses.len(), 1);
    let prop_stat = &response.responses[0].prop_stats[0];
    assert_eq!(prop_stat.status, "HTTP/1.1 404 Not Found");
    assert!(!prop_stat.is_success());
    assert!(response.responses[0].props().get_etag.is_none());
}

#[test]
fn response_parse_sync_token() {
    let xml = "\
<D:multistatus xmlns:D=\"DAV:\">
  <D:response>
    <D:href>/cal/gone.ics</D:href>
    <D:status>HTTP/1.1 404 Not Found</D:status>
  </D:response>
  <D:sync-token>http://example.com/sync/7</D:sync-token>
</D:multistatus>";

    let response = MultiStatusResponse::from_xml(xml).expect("Failed to parse multistatus");
    assert_eq!(response.sync_token.as_deref(), Some("http://example.com/sync/7"));
    assert_eq!(response.responses[0].status_code(), Some(404));
}
