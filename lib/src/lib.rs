use log::debug;
use malachite::num::arithmetic::traits::{Abs, Lcm};
use malachite::num::basic::traits::{One, Zero};
use malachite::{Natural, Rational};
use std::cmp::{max, min};
use std::collections::HashMap;
use std::iter::zip;
use std::mem;
use thiserror::Error;





/// Arrow token separating reactants from products in input equations
pub const ARROW_INPUT: &str = "->";

/// Arrow glyph used when rendering a balanced equation
pub const ARROW_OUTPUT: &str = "→";





/// Errors that can occur during parsing or balancing an equation
#[derive(Clone, Debug, Eq, Hash, PartialEq, Error)]
pub enum BalanceError {
    /// Input is not of the form `REACTANTS->PRODUCTS`
    #[error("malformed equation: {0}")]
    MalformedEquation(String),
    /// A compound formula could not be parsed
    #[error("malformed formula {formula:?}: {reason}")]
    MalformedFormula {
        /// The offending formula text
        formula: String,
        /// What was wrong with it
        reason: String,
    },
    /// More than one independent balance satisfies the equation
    #[error("underdetermined system: {free_variables} independent balances exist")]
    UnderdeterminedSystem {
        /// Dimension of the solution space
        free_variables: usize,
    },
    /// No non-zero balance satisfies the equation
    #[error("overdetermined system: element {element} cannot be balanced")]
    OverdeterminedSystem {
        /// The element whose conservation constraint admits only the all-zero solution
        element: String,
    },
    /// The computed coefficients do not balance an element (checked, never expected)
    #[error("element {element} is not balanced by the computed coefficients")]
    Unbalanced {
        /// The element whose atom counts differ between the two sides
        element: String,
    },
    /// A rescaled coefficient came out zero or negative
    #[error("coefficient {coefficient} for compound {compound} is not positive")]
    NonPositiveCoefficient {
        /// The compound the coefficient belongs to
        compound: String,
        /// The offending coefficient
        coefficient: i64,
    },
    /// A rescaled coefficient does not fit in i64
    #[error("coefficient out of range")]
    CoefficientOverflow,
    /// Matrix has wrong dimensions (rows and columns)
    #[error("wrong matrix dimensions")]
    WrongMatrixDimensions,
}





/// A struct that represents a chemical equation (e.g. 2H2 + O2 -> 2H2O)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Equation {
    /// String from which the equation was parsed
    original_str: String,
    /// A vector of reactants
    reactants: Vec<Compound>,
    /// A vector of products
    products: Vec<Compound>,
    /// Element symbols in first-seen order across the whole equation
    registry: ElementRegistry,
    /// A vector of solutions for reactants (stoichiometric coefficients)
    solutions_reactants: Option<Vec<i64>>,
    /// A vector of solutions for products (stoichiometric coefficients)
    solutions_products: Option<Vec<i64>>,
}
impl Equation {
    /// Create new equation from a plain-text string
    /// The equation should contain exactly one `->` between reactants and products,
    /// with compounds on each side separated by `+`
    /// All whitespace is stripped before parsing
    /// # Arguments
    /// * `input` - equation string
    /// # Returns
    /// * `Ok` - equation
    /// * `Err` - error that occurred during parsing
    /// # Example
    /// ```
    /// use chembal::Equation;
    ///
    /// let equation_str = "H2 + O2 -> H2O";
    /// let equation = Equation::parse(equation_str).unwrap();
    ///
    /// assert_eq!(equation.original_str(), equation_str);
    /// assert_eq!(equation.reactants().len(), 2);
    /// assert_eq!(equation.products().len(), 1);
    /// assert_eq!(equation.registry().symbols(), ["H", "O"]);
    /// ```
    pub fn parse(input: &str) -> Result<Self, BalanceError> {
        // store original string
        let original_str = input.to_string();

        // whitespace carries no meaning anywhere in an equation
        let stripped: String = input.chars().filter(|c| !c.is_whitespace()).collect();

        let sides: Vec<&str> = stripped.split(ARROW_INPUT).collect();
        if sides.len() < 2 {
            return Err(BalanceError::MalformedEquation(format!(
                "missing {ARROW_INPUT:?} separator"
            )));
        }
        if sides.len() > 2 {
            return Err(BalanceError::MalformedEquation(format!(
                "more than one {ARROW_INPUT:?} separator"
            )));
        }

        // processes one side of the equation, registering elements as they appear
        let parse_side = |side: &str,
                          registry: &mut ElementRegistry|
         -> Result<Vec<Compound>, BalanceError> {
            if side.is_empty() {
                return Err(BalanceError::MalformedEquation(
                    "empty equation side".to_string(),
                ));
            }
            let mut compounds = Vec::new();
            for piece in side.split('+') {
                if piece.is_empty() {
                    return Err(BalanceError::MalformedEquation(
                        "empty compound segment".to_string(),
                    ));
                }
                compounds.push(Compound::parse(piece, registry)?);
            }
            Ok(compounds)
        };

        // reactants are scanned before products so the registry keeps first-seen order
        let mut registry = ElementRegistry::new();
        let reactants = parse_side(sides[0], &mut registry)?;
        let products = parse_side(sides[1], &mut registry)?;

        debug!(
            "parsed {} reactants and {} products over {} elements",
            reactants.len(),
            products.len(),
            registry.len()
        );

        Ok(Self {
            original_str,
            reactants,
            products,
            registry,
            solutions_reactants: None,
            solutions_products: None,
        })
    }

    /// Builds the signed stoichiometry matrix of the equation
    /// Rows are elements in registry order, columns are compounds in reaction order,
    /// cell values are atom counts, positive for reactants and negative for products
    /// # Returns
    /// * `Vec<Vec<i64>>` - matrix of dimensions (number of elements) x (number of compounds)
    /// # Example
    /// ```
    /// use chembal::Equation;
    ///
    /// let equation = Equation::parse("H2+O2->H2O").unwrap();
    ///
    /// assert_eq!(equation.stoichiometry_matrix(), vec![
    ///     vec![2, 0, -2],
    ///     vec![0, 2, -1],
    /// ]);
    /// ```
    pub fn stoichiometry_matrix(&self) -> Vec<Vec<i64>> {
        let columns = self.reactants.len() + self.products.len();
        let mut matrix = vec![vec![0i64; columns]; self.registry.len()];
        for (row, symbol) in self.registry.symbols().iter().enumerate() {
            for (col, compound) in self.reactants.iter().enumerate() {
                matrix[row][col] = compound.count(symbol);
            }
            for (col, compound) in self.products.iter().enumerate() {
                matrix[row][self.reactants.len() + col] = -compound.count(symbol);
            }
        }
        matrix
    }

    /// Solves the equation
    /// On success the stoichiometric coefficients become available through
    /// [`Equation::solution_reactants`], [`Equation::solution_products`] and
    /// [`Equation::solution_str`]
    /// # Returns
    /// * `Ok` - if the equation was solved successfully
    /// * `Err` - if the equation was not solved successfully
    /// # Example
    /// ```
    /// use chembal::Equation;
    ///
    /// let mut equation = Equation::parse("Fe+O2->Fe2O3").unwrap();
    /// equation.solve().unwrap();
    ///
    /// assert_eq!(equation.solution_str().unwrap(), "4Fe + 3O2 → 2Fe2O3");
    /// ```
    pub fn solve(&mut self) -> Result<(), BalanceError> {
        let matrix = self.stoichiometry_matrix();
        let coefficients = balance_matrix(&matrix, self.registry.symbols())?;

        // check if solutions are correct: every element must balance exactly
        for (row, element) in zip(matrix.iter(), self.registry.symbols().iter()) {
            let total: i64 = zip(row.iter(), coefficients.iter())
                .map(|(count, coefficient)| count * coefficient)
                .sum();
            if total != 0 {
                return Err(BalanceError::Unbalanced {
                    element: element.clone(),
                });
            }
        }

        // a balanced reaction needs every compound to actually take part
        let compounds = self.reactants.iter().chain(self.products.iter());
        for (compound, &coefficient) in zip(compounds, coefficients.iter()) {
            if coefficient <= 0 {
                return Err(BalanceError::NonPositiveCoefficient {
                    compound: compound.original_str().to_string(),
                    coefficient,
                });
            }
        }

        let (reactants_solutions, products_solutions) =
            coefficients.split_at(self.reactants.len());
        self.solutions_reactants = Some(reactants_solutions.to_vec());
        self.solutions_products = Some(products_solutions.to_vec());

        Ok(())
    }

    /// Returns the original string from which the equation was parsed
    /// # Returns
    /// * `&str` - original string
    pub fn original_str(&self) -> &str {
        &self.original_str
    }

    /// Returns the vector of reactants
    /// # Returns
    /// * `&Vec<Compound>` - vector of reactants
    pub fn reactants(&self) -> &Vec<Compound> {
        &self.reactants
    }

    /// Returns the vector of products
    /// # Returns
    /// * `&Vec<Compound>` - vector of products
    pub fn products(&self) -> &Vec<Compound> {
        &self.products
    }

    /// Returns the element registry of the equation
    /// # Returns
    /// * `&ElementRegistry` - element symbols in first-seen order
    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    /// Returns the vector of solutions for reactants (stoichiometric coefficients)
    /// # Returns
    /// * `Option<&Vec<i64>>` - vector of solutions for reactants
    /// # Example
    /// ```
    /// use chembal::Equation;
    ///
    /// let mut equation = Equation::parse("H2+O2->H2O").unwrap();
    /// equation.solve().unwrap();
    ///
    /// assert_eq!(equation.solution_reactants().unwrap(), &[2, 1]);
    /// ```
    pub fn solution_reactants(&self) -> Option<&Vec<i64>> {
        self.solutions_reactants.as_ref()
    }

    /// Returns the vector of solutions for products (stoichiometric coefficients)
    /// # Returns
    /// * `Option<&Vec<i64>>` - vector of solutions for products
    /// # Example
    /// ```
    /// use chembal::Equation;
    ///
    /// let mut equation = Equation::parse("H2+O2->H2O").unwrap();
    /// equation.solve().unwrap();
    ///
    /// assert_eq!(equation.solution_products().unwrap(), &[2]);
    /// ```
    pub fn solution_products(&self) -> Option<&Vec<i64>> {
        self.solutions_products.as_ref()
    }

    /// Returns the solution of the equation as a string
    /// Coefficients equal to 1 are omitted, compounds on the same side are joined
    /// by `" + "` and the sides are joined by the arrow glyph
    /// # Returns
    /// * `Option<String>` - solution of the equation as a string
    /// # Example
    /// ```
    /// use chembal::Equation;
    ///
    /// let mut equation = Equation::parse("Ca(OH)2+HCl->CaCl2+H2O").unwrap();
    /// equation.solve().unwrap();
    ///
    /// assert_eq!(equation.solution_str().unwrap(), "Ca(OH)2 + 2HCl → CaCl2 + 2H2O");
    /// ```
    pub fn solution_str(&self) -> Option<String> {
        let sols_reactants = self.solutions_reactants.as_ref()?;
        let sols_products = self.solutions_products.as_ref()?;

        let mut reactants_str = String::new();
        for (i, (reactant, coefficient)) in
            zip(self.reactants.iter(), sols_reactants.iter()).enumerate()
        {
            if i != 0 {
                reactants_str.push_str(" + ");
            }
            if *coefficient != 1 {
                reactants_str.push_str(&coefficient.to_string());
            }
            reactants_str.push_str(reactant.original_str());
        }

        let mut products_str = String::new();
        for (i, (product, coefficient)) in
            zip(self.products.iter(), sols_products.iter()).enumerate()
        {
            if i != 0 {
                products_str.push_str(" + ");
            }
            if *coefficient != 1 {
                products_str.push_str(&coefficient.to_string());
            }
            products_str.push_str(product.original_str());
        }

        Some(format!("{} {} {}", reactants_str, ARROW_OUTPUT, products_str))
    }

    /// Returns the solution of the equation with every digit as a subscript glyph
    /// # Returns
    /// * `Option<String>` - solution of the equation for display
    /// # Example
    /// ```
    /// use chembal::Equation;
    ///
    /// let mut equation = Equation::parse("H2+O2->H2O").unwrap();
    /// equation.solve().unwrap();
    ///
    /// assert_eq!(equation.display_str().unwrap(), "₂H₂ + O₂ → ₂H₂O");
    /// ```
    pub fn display_str(&self) -> Option<String> {
        self.solution_str().map(|solution| to_subscript(&solution))
    }
}





/// A struct that represents a chemical compound (e.g. H2O, NaCl, ...)
/// # Example
/// ```
/// use chembal::{Compound, ElementRegistry};
///
/// let mut registry = ElementRegistry::new();
/// let compound = Compound::parse("H2O", &mut registry).unwrap();
///
/// assert_eq!(compound.original_str(), "H2O");
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Compound {
    /// String from which the compound was parsed
    original_str: String,
    /// Flat form of the formula: no brackets, every count explicit
    expanded_str: String,
    /// HashMap of element symbols and their counts
    elements: HashMap<String, i64>,
}
impl Compound {
    /// Create new compound from a plain-text formula
    /// The formula may contain nested groups in round or square brackets;
    /// element symbols are opaque identifiers (an uppercase letter followed by
    /// lowercase letters) and are not checked against the periodic table
    /// Newly seen symbols are appended to `registry` in order of first occurrence
    /// # Arguments
    /// * `input` - formula string
    /// * `registry` - element registry shared across the whole equation
    /// # Returns
    /// * `Ok` - compound
    /// * `Err` - error that occurred during parsing
    /// # Example
    /// ```
    /// use chembal::{Compound, ElementRegistry};
    ///
    /// let mut registry = ElementRegistry::new();
    /// let compound = Compound::parse("Ca(OH)2", &mut registry).unwrap();
    ///
    /// assert_eq!(compound.original_str(), "Ca(OH)2");
    /// assert_eq!(compound.expanded_str(), "Ca1O2H2");
    /// assert_eq!(compound.count("Ca"), 1);
    /// assert_eq!(compound.count("O"), 2);
    /// assert_eq!(compound.count("H"), 2);
    /// assert_eq!(registry.symbols(), ["Ca", "O", "H"]);
    /// ```
    pub fn parse(input: &str, registry: &mut ElementRegistry) -> Result<Self, BalanceError> {
        let malformed = |reason: String| BalanceError::MalformedFormula {
            formula: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(malformed("empty formula".to_string()));
        }

        // alphabet and bracket checks come first so later stages only see valid text
        let mut depth = 0i32;
        for c in input.chars() {
            match c {
                '(' | '[' => depth += 1,
                ')' | ']' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(malformed("unmatched closing bracket".to_string()));
                    }
                }
                c if c.is_ascii_alphanumeric() => {}
                c => return Err(malformed(format!("unexpected character {c:?}"))),
            }
        }
        if depth != 0 {
            return Err(malformed("unmatched opening bracket".to_string()));
        }

        let normalized = normalize(input);
        let pairs = expand_pairs(&normalized).map_err(|error| match error {
            // report the user's text, not the normalized form
            BalanceError::MalformedFormula { reason, .. } => malformed(reason),
            other => other,
        })?;

        let mut expanded_str = String::new();
        let mut elements = HashMap::new();
        for (symbol, count) in &pairs {
            expanded_str.push_str(symbol);
            expanded_str.push_str(&count.to_string());
            if *count > 0 {
                *elements.entry(symbol.clone()).or_insert(0) += count;
                registry.register(symbol);
            }
        }
        if elements.is_empty() {
            return Err(malformed("formula contains no elements".to_string()));
        }

        Ok(Self {
            original_str: input.to_string(),
            expanded_str,
            elements,
        })
    }

    /// Returns the original string from which the compound was parsed
    /// # Returns
    /// * `&str` - original string
    pub fn original_str(&self) -> &str {
        &self.original_str
    }

    /// Returns the flat expanded form of the formula
    /// # Returns
    /// * `&str` - expanded formula, bracket-free, every count explicit
    /// # Example
    /// ```
    /// use chembal::{Compound, ElementRegistry};
    ///
    /// let mut registry = ElementRegistry::new();
    /// let compound = Compound::parse("K4[Fe(SCN)6]", &mut registry).unwrap();
    ///
    /// assert_eq!(compound.expanded_str(), "K4Fe1S6C6N6");
    /// ```
    pub fn expanded_str(&self) -> &str {
        &self.expanded_str
    }

    /// Returns the HashMap of element symbols and their counts in the compound
    /// For example, in the compound H2O the HashMap will be {"H": 2, "O": 1}
    /// # Returns
    /// * `&HashMap<String, i64>` - HashMap of element symbols and their counts
    pub fn elements(&self) -> &HashMap<String, i64> {
        &self.elements
    }

    /// Returns the atom count of one element in the compound, 0 if absent
    /// # Returns
    /// * `i64` - atom count
    /// # Example
    /// ```
    /// use chembal::{Compound, ElementRegistry};
    ///
    /// let mut registry = ElementRegistry::new();
    /// let compound = Compound::parse("C5H6OOH", &mut registry).unwrap();
    ///
    /// assert_eq!(compound.count("H"), 7);
    /// assert_eq!(compound.count("O"), 2);
    /// assert_eq!(compound.count("Na"), 0);
    /// ```
    pub fn count(&self, symbol: &str) -> i64 {
        self.elements.get(symbol).copied().unwrap_or(0)
    }
}





/// Insertion-ordered set of element symbols
/// The position a symbol gets on first registration is its row index in the
/// stoichiometry matrix and never changes afterwards
/// # Example
/// ```
/// use chembal::ElementRegistry;
///
/// let mut registry = ElementRegistry::new();
/// registry.register("H");
/// registry.register("O");
/// registry.register("H");
///
/// assert_eq!(registry.symbols(), ["H", "O"]);
/// assert_eq!(registry.index_of("O"), Some(1));
/// assert_eq!(registry.index_of("Fe"), None);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ElementRegistry {
    symbols: Vec<String>,
}
impl ElementRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a symbol if it has not been seen before
    pub fn register(&mut self, symbol: &str) {
        if !self.symbols.iter().any(|s| s == symbol) {
            self.symbols.push(symbol.to_string());
        }
    }

    /// Returns the row index assigned to a symbol
    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Returns the registered symbols in first-seen order
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Returns the number of registered symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true if no symbol has been registered
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}





/// Rewrites a formula so that every implicit count of 1 becomes explicit
/// Square brackets are unified to round ones, then a `1` is inserted after every
/// element symbol and every closing bracket that is not already followed by digits
/// # Arguments
/// * `formula` - raw formula string
/// # Returns
/// * `String` - normalized formula
/// # Example
/// ```
/// use chembal::normalize;
///
/// assert_eq!(normalize("H2O"), "H2O1");
/// assert_eq!(normalize("KMnO4"), "K1Mn1O4");
/// assert_eq!(normalize("Ca(OH)2"), "Ca1(O1H1)2");
/// assert_eq!(normalize("[Cr(CN)6]3"), "(Cr1(C1N1)6)3");
/// ```
pub fn normalize(formula: &str) -> String {
    let chars: Vec<char> = formula
        .chars()
        .map(|c| match c {
            '[' => '(',
            ']' => ')',
            c => c,
        })
        .collect();

    let mut normalized = String::with_capacity(chars.len() * 2);
    for (i, &c) in chars.iter().enumerate() {
        normalized.push(c);
        let insert_one = match chars.get(i + 1) {
            // a group without a trailing digit run has multiplicity 1,
            // an element symbol run ends before an uppercase letter or a bracket
            Some(&next) => match c {
                ')' => !next.is_ascii_digit(),
                c if c.is_ascii_alphabetic() => {
                    next.is_ascii_uppercase() || next == '(' || next == ')'
                }
                _ => false,
            },
            None => c.is_ascii_alphabetic() || c == ')',
        };
        if insert_one {
            normalized.push('1');
        }
    }
    normalized
}

/// Returns the index one past the digit run starting at `start`
fn digit_run(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    end
}

/// Expands a normalized formula into its flat list of (symbol, count) pairs
/// Groups are resolved innermost-first with an explicit stack; pairs keep their
/// textual order and duplicate symbols are not merged
fn expand_pairs(formula: &str) -> Result<Vec<(String, i64)>, BalanceError> {
    let malformed = |reason: String| BalanceError::MalformedFormula {
        formula: formula.to_string(),
        reason,
    };

    let chars: Vec<char> = formula.chars().collect();
    let mut stack: Vec<Vec<(String, i64)>> = Vec::new();
    let mut current: Vec<(String, i64)> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '(' => {
                stack.push(mem::take(&mut current));
                i += 1;
            }
            ')' => {
                i += 1;
                let end = digit_run(&chars, i);
                if end == i {
                    return Err(malformed(
                        "missing multiplier after closing bracket".to_string(),
                    ));
                }
                let multiplier: i64 = chars[i..end]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| malformed("count out of range".to_string()))?;
                i = end;

                let mut parent = stack
                    .pop()
                    .ok_or_else(|| malformed("unmatched closing bracket".to_string()))?;
                for (symbol, count) in current {
                    let scaled = count
                        .checked_mul(multiplier)
                        .ok_or_else(|| malformed("count out of range".to_string()))?;
                    parent.push((symbol, scaled));
                }
                current = parent;
            }
            c if c.is_ascii_uppercase() => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_lowercase() {
                    i += 1;
                }
                let symbol: String = chars[start..i].iter().collect();

                let end = digit_run(&chars, i);
                if end == i {
                    return Err(malformed(format!("missing count after element {symbol}")));
                }
                let count: i64 = chars[i..end]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| malformed("count out of range".to_string()))?;
                i = end;

                current.push((symbol, count));
            }
            c => return Err(malformed(format!("unexpected character {c:?}"))),
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unmatched opening bracket".to_string()));
    }
    Ok(current)
}

/// Expands a normalized formula into its flat form with no brackets left
/// Counts inside groups are multiplied through by the group multipliers;
/// element runs keep their textual order, so input that is already flat and
/// fully explicit passes through unchanged
/// # Arguments
/// * `formula` - normalized formula (see [`normalize`])
/// # Returns
/// * `Ok` - flat formula
/// * `Err` - error that occurred during expansion
/// # Example
/// ```
/// use chembal::{expand, normalize};
///
/// assert_eq!(expand("Ca1(O1H1)2").unwrap(), "Ca1O2H2");
/// assert_eq!(expand("H2O1").unwrap(), "H2O1");
/// assert_eq!(expand(&normalize("K4[Fe(SCN)6]")).unwrap(), "K4Fe1S6C6N6");
/// ```
pub fn expand(formula: &str) -> Result<String, BalanceError> {
    let pairs = expand_pairs(formula)?;
    let mut flat = String::with_capacity(formula.len());
    for (symbol, count) in &pairs {
        flat.push_str(symbol);
        flat.push_str(&count.to_string());
    }
    Ok(flat)
}





/// Finds the smallest positive integer coefficient vector in the null space of
/// a stoichiometry matrix
/// # Arguments
/// * `matrix` - signed stoichiometry matrix, one row per element, one column per compound
/// * `elements` - element symbol of each row, used to name the element in solver errors
/// # Returns
/// * `Ok` - vector of coefficients, one per column
/// * `Err` - error that occurred during solving
/// # Example
/// ```
/// use chembal::balance_matrix;
///
/// // H2 + O2 -> H2O
/// let matrix = vec![
///     vec![2, 0, -2],  // H
///     vec![0, 2, -1],  // O
/// ];
/// let elements = vec!["H".to_string(), "O".to_string()];
///
/// assert_eq!(balance_matrix(&matrix, &elements).unwrap(), vec![2, 1, 2]);
/// ```
pub fn balance_matrix(matrix: &[Vec<i64>], elements: &[String]) -> Result<Vec<i64>, BalanceError> {
    // compute dimensions (m x n)
    // m - number of rows (elements)
    // n - number of columns (compounds)
    let m = matrix.len();
    if m == 0 || elements.len() != m {
        return Err(BalanceError::WrongMatrixDimensions);
    }
    let n = matrix[0].len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return Err(BalanceError::WrongMatrixDimensions);
    }

    // the whole reduction runs on exact rationals, the final rescale reads the
    // denominators off the reduced entries
    let mut rational: Vec<Vec<Rational>> = matrix
        .iter()
        .map(|row| row.iter().map(|&x| Rational::from(x)).collect())
        .collect();
    let mut labels = elements.to_vec();

    let pivots = reduced_row_echelon(&mut rational, &mut labels);
    let free: Vec<usize> = (0..n).filter(|col| !pivots.contains(col)).collect();
    debug!("pivot columns {:?}, free columns {:?}", pivots, free);

    match free.len() {
        0 => {
            // every column has a pivot, so the pivots occupy columns 0..n in row
            // order and row n-1 holds the constraint that pins the last compound
            // to zero
            Err(BalanceError::OverdeterminedSystem {
                element: labels[n - 1].clone(),
            })
        }
        1 => {
            // one-dimensional null space: fix the free coefficient to 1 and read
            // every pivot coefficient off the free column of its pivot row
            let free_col = free[0];
            let mut coefficients = vec![Rational::ZERO; n];
            coefficients[free_col] = Rational::ONE;
            for (row, &pivot_col) in pivots.iter().enumerate() {
                coefficients[pivot_col] = -&rational[row][free_col];
            }

            // multiply by the least common multiple of denominators to get integers
            let mut lcm = Natural::ONE;
            for coefficient in coefficients.iter() {
                lcm = lcm.lcm(coefficient.denominator_ref());
            }
            debug!("denominator lcm: {}", lcm);

            let scale = Rational::from(&lcm);
            coefficients
                .iter()
                .map(|coefficient| {
                    i64::try_from(&(coefficient * &scale))
                        .map_err(|_| BalanceError::CoefficientOverflow)
                })
                .collect()
        }
        free_variables => Err(BalanceError::UnderdeterminedSystem { free_variables }),
    }
}

/// Reduces a matrix to reduced row-echelon form in place
/// Rows are swapped for partial pivoting; `labels` is permuted alongside so the
/// caller can still tell which row belongs to which label afterwards
/// # Arguments
/// * `matrix` - matrix of exact rationals
/// * `labels` - one label per row
/// # Returns
/// * `Vec<usize>` - pivot column of each row, in row order
/// # Example
/// ```
/// use chembal::reduced_row_echelon;
/// use malachite::Rational;
///
/// let mut matrix = vec![
///     vec![Rational::from(2), Rational::from(0), Rational::from(-2)],
///     vec![Rational::from(0), Rational::from(2), Rational::from(-1)],
/// ];
/// let mut labels = vec!["H".to_string(), "O".to_string()];
///
/// let pivots = reduced_row_echelon(&mut matrix, &mut labels);
///
/// assert_eq!(pivots, vec![0, 1]);
/// assert_eq!(matrix[0], vec![Rational::from(1), Rational::from(0), Rational::from(-1)]);
/// assert_eq!(matrix[1][2], Rational::from_signeds(-1, 2));
/// ```
pub fn reduced_row_echelon(matrix: &mut [Vec<Rational>], labels: &mut [String]) -> Vec<usize> {
    let m = matrix.len();
    let n = if m == 0 { 0 } else { matrix[0].len() };

    let mut pivots = Vec::new();
    let mut row = 0;
    for col in 0..n {
        if row >= m {
            break;
        }

        // pick the row with the largest entry in this column
        let mut i_max = row;
        for i in (row + 1)..m {
            if (&matrix[i][col]).abs() > (&matrix[i_max][col]).abs() {
                i_max = i;
            }
        }
        if matrix[i_max][col] == Rational::ZERO {
            continue;
        }
        swap_rows(row, i_max, matrix);
        labels.swap(row, i_max);

        // normalize the pivot row, then clear the column in every other row
        let inverse = Rational::ONE / &matrix[row][col];
        for entry in matrix[row].iter_mut() {
            *entry *= inverse.clone();
        }
        for i in 0..m {
            if i == row || matrix[i][col] == Rational::ZERO {
                continue;
            }
            let factor = matrix[i][col].clone();
            for j in 0..n {
                let sub = &factor * &matrix[row][j];
                matrix[i][j] -= sub;
            }
        }

        pivots.push(col);
        row += 1;
    }
    pivots
}

/// Swaps two rows in a matrix
/// # Arguments
/// * `r1` - index of the first row
/// * `r2` - index of the second row
/// * `matrix` - the matrix
#[inline(always)]
pub fn swap_rows<T>(r1: usize, r2: usize, matrix: &mut [Vec<T>]) {
    if r1 != r2 {
        let bigger_r = max(r1, r2);
        let smaller_r = min(r1, r2);
        let (top, bot) = matrix.split_at_mut(bigger_r);  // splits before bigger_r so index 0 in bot will be bigger_r
        mem::swap(&mut top[smaller_r], &mut bot[0])
    }
}





/// Replaces every ASCII digit with its Unicode subscript glyph
/// # Arguments
/// * `s` - input string
/// # Returns
/// * `String` - string with subscripted digits
/// # Example
/// ```
/// use chembal::to_subscript;
///
/// assert_eq!(to_subscript("H2O"), "H₂O");
/// assert_eq!(to_subscript("2H2"), "₂H₂");
/// ```
pub fn to_subscript(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32(0x2080 + d).unwrap_or(c),
            None => c,
        })
        .collect()
}





#[cfg(test)]
mod tests {
    use super::*;

    fn test_equation(equation: &str, solved_equation: &str) {
        let mut eq = Equation::parse(equation).unwrap();
        eq.solve().unwrap();
        let solution = eq.solution_str().unwrap();

        assert_eq!(solution, solved_equation);
    }

    fn gcd(a: i64, b: i64) -> i64 {
        if b == 0 { a.abs() } else { gcd(b, a % b) }
    }


    #[test]
    fn normalize_inserts_counts() {
        assert_eq!(normalize("H2O"), "H2O1");
        assert_eq!(normalize("Na"), "Na1");
        assert_eq!(normalize("KMnO4"), "K1Mn1O4");
        assert_eq!(normalize("Ca(OH)2"), "Ca1(O1H1)2");
        assert_eq!(normalize("C5H6OOH"), "C5H6O1O1H1");
    }

    #[test]
    fn normalize_unifies_brackets() {
        assert_eq!(normalize("[Cr(CN)6]3"), "(Cr1(C1N1)6)3");
        assert_eq!(normalize("K4[Fe(SCN)6]"), "K4(Fe1(S1C1N1)6)1");
    }

    #[test]
    fn normalize_adjacent_groups() {
        assert_eq!(normalize("(OH)(OH)2"), "(O1H1)1(O1H1)2");
        assert_eq!(normalize("((OH))2"), "((O1H1)1)2");
    }

    #[test]
    fn normalize_is_idempotent() {
        for formula in ["H2O1", "Ca1(O1H1)2", "K4(Fe1(S1C1N1)6)1"] {
            assert_eq!(normalize(formula), formula);
        }
    }

    #[test]
    fn expand_flattens_groups() {
        assert_eq!(expand("Ca1(O1H1)2").unwrap(), "Ca1O2H2");
        assert_eq!(expand(&normalize("K4[Fe(SCN)6]")).unwrap(), "K4Fe1S6C6N6");
        assert_eq!(expand(&normalize("(OH)(OH)2")).unwrap(), "O1H1O2H2");
        assert_eq!(expand(&normalize("((OH))2")).unwrap(), "O2H2");
    }

    #[test]
    fn expand_keeps_flat_input_unchanged() {
        assert_eq!(expand("H2O1").unwrap(), "H2O1");
        assert_eq!(expand("C5H7O2").unwrap(), "C5H7O2");
    }

    #[test]
    fn expand_rejects_mismatched_brackets() {
        assert!(matches!(
            expand("Ca1(O1H1"),
            Err(BalanceError::MalformedFormula { .. })
        ));
        assert!(matches!(
            expand("Ca1)2O1"),
            Err(BalanceError::MalformedFormula { .. })
        ));
    }

    #[test]
    fn compound_sums_repeated_elements() {
        let mut registry = ElementRegistry::new();
        let compound = Compound::parse("C5H6OOH", &mut registry).unwrap();

        assert_eq!(compound.expanded_str(), "C5H6O1O1H1");
        assert_eq!(compound.count("C"), 5);
        assert_eq!(compound.count("H"), 7);
        assert_eq!(compound.count("O"), 2);
        assert_eq!(registry.symbols(), ["C", "H", "O"]);
    }

    #[test]
    fn registry_keeps_first_seen_order() {
        let equation = Equation::parse("Ca(OH)2+HCl->CaCl2+H2O").unwrap();
        assert_eq!(equation.registry().symbols(), ["Ca", "O", "H", "Cl"]);
    }

    #[test]
    fn matrix_signs_and_dimensions() {
        let equation = Equation::parse("H2+O2->H2O").unwrap();
        assert_eq!(
            equation.stoichiometry_matrix(),
            vec![vec![2, 0, -2], vec![0, 2, -1]]
        );
    }

    #[test]
    fn solution_balances_every_element() {
        let mut equation = Equation::parse("KNO3+C12H22O11->N2+CO2+H2O+K2CO3").unwrap();
        equation.solve().unwrap();

        let matrix = equation.stoichiometry_matrix();
        let mut coefficients = equation.solution_reactants().unwrap().clone();
        coefficients.extend(equation.solution_products().unwrap());
        assert_eq!(coefficients, vec![48, 5, 24, 36, 55, 24]);

        for row in matrix {
            let total: i64 = zip(row.iter(), coefficients.iter())
                .map(|(count, coefficient)| count * coefficient)
                .sum();
            assert_eq!(total, 0);
        }
    }

    #[test]
    fn coefficients_are_coprime() {
        for equation_str in [
            "H2+O2->H2O",
            "Fe+O2->Fe2O3",
            "KNO3+C12H22O11->N2+CO2+H2O+K2CO3",
        ] {
            let mut equation = Equation::parse(equation_str).unwrap();
            equation.solve().unwrap();

            let mut coefficients = equation.solution_reactants().unwrap().clone();
            coefficients.extend(equation.solution_products().unwrap());
            let common = coefficients.iter().fold(0, |acc, &c| gcd(acc, c));
            assert_eq!(common, 1);
        }
    }

    #[test]
    fn missing_arrow_is_rejected() {
        let result = Equation::parse("H2+O2H2O");
        assert!(matches!(result, Err(BalanceError::MalformedEquation(_))));
    }

    #[test]
    fn repeated_arrow_is_rejected() {
        let result = Equation::parse("H2->O2->H2O");
        assert!(matches!(result, Err(BalanceError::MalformedEquation(_))));
    }

    #[test]
    fn empty_sides_are_rejected() {
        assert!(matches!(
            Equation::parse("->H2O"),
            Err(BalanceError::MalformedEquation(_))
        ));
        assert!(matches!(
            Equation::parse("H2O->"),
            Err(BalanceError::MalformedEquation(_))
        ));
        assert!(matches!(
            Equation::parse("H2+->H2O"),
            Err(BalanceError::MalformedEquation(_))
        ));
    }

    #[test]
    fn invalid_characters_are_rejected() {
        assert!(matches!(
            Equation::parse("H2!+O2->H2O"),
            Err(BalanceError::MalformedFormula { .. })
        ));
        assert!(matches!(
            Equation::parse("h2+O2->H2O"),
            Err(BalanceError::MalformedFormula { .. })
        ));
    }

    #[test]
    fn mismatched_brackets_are_rejected() {
        assert!(matches!(
            Equation::parse("Ca(OH2+HCl->CaCl2+H2O"),
            Err(BalanceError::MalformedFormula { .. })
        ));
        assert!(matches!(
            Equation::parse("Ca)OH(2+HCl->CaCl2+H2O"),
            Err(BalanceError::MalformedFormula { .. })
        ));
    }

    #[test]
    fn underdetermined_system_is_reported() {
        let mut equation = Equation::parse("C+O2->CO+CO2").unwrap();
        assert_eq!(
            equation.solve(),
            Err(BalanceError::UnderdeterminedSystem { free_variables: 2 })
        );
        assert!(equation.solution_str().is_none());
    }

    #[test]
    fn overdetermined_system_is_reported() {
        let mut equation = Equation::parse("H2+O2->NH3+CO2").unwrap();
        assert_eq!(
            equation.solve(),
            Err(BalanceError::OverdeterminedSystem {
                element: "C".to_string()
            })
        );
        assert!(equation.solution_str().is_none());
    }

    #[test]
    fn forced_zero_coefficient_is_reported() {
        let mut equation = Equation::parse("H2+O2->H2O+Cl2").unwrap();
        assert_eq!(
            equation.solve(),
            Err(BalanceError::NonPositiveCoefficient {
                compound: "Cl2".to_string(),
                coefficient: 0
            })
        );
        assert!(equation.solution_str().is_none());
    }

    #[test]
    fn whitespace_is_stripped() {
        test_equation("  H2 + O2 -> H2O ", "2H2 + O2 → 2H2O");
    }

    #[test]
    fn subscript_glyphs() {
        assert_eq!(to_subscript("0123456789"), "₀₁₂₃₄₅₆₇₈₉");
        assert_eq!(to_subscript("Fe2O3"), "Fe₂O₃");
    }

    #[test]
    fn display_subscripts_every_digit() {
        let mut equation = Equation::parse("H2+O2->H2O").unwrap();
        equation.solve().unwrap();
        assert_eq!(equation.display_str().unwrap(), "₂H₂ + O₂ → ₂H₂O");
    }


    #[test]
    fn eq1() {
        test_equation("H2+O2->H2O", "2H2 + O2 → 2H2O");
    }

    #[test]
    fn eq2() {
        test_equation("Ca(OH)2+HCl->CaCl2+H2O", "Ca(OH)2 + 2HCl → CaCl2 + 2H2O");
    }

    #[test]
    fn eq3() {
        test_equation("Fe+O2->Fe2O3", "4Fe + 3O2 → 2Fe2O3");
    }

    #[test]
    fn eq4() {
        test_equation("P4O10+H2O->H3PO4", "P4O10 + 6H2O → 4H3PO4");
    }

    #[test]
    fn eq5() {
        test_equation("CO2+H2O->C6H12O6+O2", "6CO2 + 6H2O → C6H12O6 + 6O2");
    }

    #[test]
    fn eq6() {
        test_equation("Al+HCl->AlCl3+H2", "2Al + 6HCl → 2AlCl3 + 3H2");
    }

    #[test]
    fn eq7() {
        test_equation("Na2CO3+HCl->NaCl+H2O+CO2", "Na2CO3 + 2HCl → 2NaCl + H2O + CO2");
    }

    #[test]
    fn eq8() {
        test_equation("C2H6+O2->CO2+H2O", "2C2H6 + 7O2 → 4CO2 + 6H2O");
    }

    #[test]
    fn eq9() {
        test_equation("NaN3->Na+N2", "2NaN3 → 2Na + 3N2");
    }

    #[test]
    fn eq10() {
        test_equation("Mg+N2->Mg3N2", "3Mg + N2 → Mg3N2");
    }

    #[test]
    fn eq11() {
        test_equation(
            "Fe2(SO4)3+KOH->K2SO4+Fe(OH)3",
            "Fe2(SO4)3 + 6KOH → 3K2SO4 + 2Fe(OH)3",
        );
    }

    #[test]
    fn eq12() {
        test_equation(
            "Ca3(PO4)2+SiO2->P4O10+CaSiO3",
            "2Ca3(PO4)2 + 6SiO2 → P4O10 + 6CaSiO3",
        );
    }

    #[test]
    fn eq13() {
        test_equation("KClO3->KClO4+KCl", "4KClO3 → 3KClO4 + KCl");
    }

    #[test]
    fn eq14() {
        test_equation(
            "Al2(SO4)3+Ca(OH)2->Al(OH)3+CaSO4",
            "Al2(SO4)3 + 3Ca(OH)2 → 2Al(OH)3 + 3CaSO4",
        );
    }

    #[test]
    fn eq15() {
        test_equation("C8H18+O2->CO2+H2O", "2C8H18 + 25O2 → 16CO2 + 18H2O");
    }

    #[test]
    fn eq16() {
        test_equation("[Cu(NH3)4]SO4->CuSO4+NH3", "[Cu(NH3)4]SO4 → CuSO4 + 4NH3");
    }

    #[test]
    fn eq17() {
        test_equation(
            "KNO3+C12H22O11->N2+CO2+H2O+K2CO3",
            "48KNO3 + 5C12H22O11 → 24N2 + 36CO2 + 55H2O + 24K2CO3",
        );
    }
}
