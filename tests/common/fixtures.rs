//! Sample results pages

/// A date page from New York with two games and an ad card
pub const RESULTS_PAGE_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>New York Lottery Results</title>
</head>
<body>
  <div class="container">
    <div class="card">
      <div class="card-header">
        <img src="/images/logos/powerball.png" alt="Powerball">
        <h3>Powerball</h3>
      </div>
      <div class="card-body">
        <div class="timer" data-enddate="Tue, May-13-2025, 10:59 PM -0400"></div>
        <div class="c-lottery-numbers">
          <div class="number">5</div>
          <div class="number">9</div>
          <div class="number">12</div>
          <div class="number">27</div>
          <div class="number">41</div>
          <div class="number highlighted">8</div>
        </div>
        <div class="amounts"><span>JackPot:</span><div class="item">$20 Million</div></div>
        <div class="next-date-div"><div class="item">Wed, May-14-2025, 10:59 PM</div></div>
      </div>
    </div>

    <div class="card ads-placeholder">
      <div class="card-header"><h3>Sponsored</h3></div>
      <div class="card-body"><div class="number">99</div></div>
    </div>

    <div class="card">
      <div class="card-header">
        <img src="https://cdn.example.com/numbers.png">
        <h3>Numbers Midday</h3>
      </div>
      <div class="card-body">
        <div class="amount__title">Tue, May 13, 2025</div>
        <div class="c-lottery-numbers">
          <div class="number">4</div>
          <div class="number">0</div>
          <div class="number">7</div>
        </div>
      </div>
    </div>
  </div>
</body>
</html>
"#;

/// A page for a date with no draws
pub const EMPTY_PAGE_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head><title>No results</title></head>
<body><div class="container"><p>No results found for this date.</p></div></body>
</html>
"#;

/// Home page carrying the jurisdiction menu
pub const MENU_PAGE_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<body>
  <form name="menuform">
  <select name="menu2">
    <option value="">Choose a state</option>
    <option value="/ny">New York</option>
    <option value="/ca">California</option>
    <option value="/ny">New York (duplicate)</option>
    <option value="/tx"> Texas </option>
  </select>
  </form>
</body>
</html>
"#;
